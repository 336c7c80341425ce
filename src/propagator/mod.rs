//! Propagation job tree: scheduling contract, directory aggregation, and the
//! bulk download job
//!
//! The orchestrator builds a tree of [`DirectoryJob`] nodes whose leaves are
//! [`BulkDownloadJob`]s seeded with the items to download for one directory.
//! A job advances when asked ([`PropagationJob::schedule_self_or_child`]) and
//! is re-entered only through asynchronous completion callbacks
//! ([`PropagationJob::process_next_event`]); [`drive`] alternates the two
//! until the tree finishes.

use async_trait::async_trait;

use crate::types::AggregateStatus;

mod bulk_download;
mod context;
mod directory;

pub use bulk_download::BulkDownloadJob;
pub use context::PropagationContext;
pub use directory::DirectoryJob;

/// Lifecycle of a propagation job. No transition leaves `Finished`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    /// Constructed, no work dispatched yet
    NotStarted,
    /// At least one piece of work was dispatched
    Running,
    /// Terminal; the aggregate status has been reported exactly once
    Finished,
}

/// Whether sibling jobs at the same tree level may run concurrently with
/// this one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JobParallelism {
    /// Siblings may run concurrently
    #[default]
    FullParallelism,
    /// The scheduler must not start later siblings until this job finishes
    /// (used when a job's effects are not safely interleavable, e.g. it
    /// restructures the directory its siblings live in)
    WaitForFinished,
}

/// Uniform scheduling contract for every node in a propagation tree.
#[async_trait]
pub trait PropagationJob: Send {
    /// Attempt to advance this job (or, for container jobs, the next
    /// eligible child) by one step.
    ///
    /// Returns whether any new work was dispatched. Safe to call repeatedly
    /// when no work is available: returns false with no side effects.
    fn schedule_self_or_child(&mut self) -> bool;

    /// This job's parallelism declaration.
    fn parallelism(&self) -> JobParallelism;

    /// Current lifecycle state.
    fn state(&self) -> JobState;

    /// Terminal aggregate status; `Some` once the job is Finished.
    fn aggregate_status(&self) -> Option<AggregateStatus>;

    /// Wait for and apply the next outstanding completion callback.
    ///
    /// Returns immediately when the job is not Running. All mutation of job
    /// bookkeeping and item status happens here or in
    /// [`schedule_self_or_child`](Self::schedule_self_or_child), never
    /// concurrently.
    async fn process_next_event(&mut self);
}

/// Drive a job tree to completion and return its aggregate status.
///
/// Repeatedly schedules until no more work can be dispatched, then processes
/// one completion callback, until the root job reports Finished.
pub async fn drive<J>(job: &mut J) -> AggregateStatus
where
    J: PropagationJob + ?Sized,
{
    loop {
        while job.schedule_self_or_child() {}
        if job.state() == JobState::Finished {
            return job.aggregate_status().unwrap_or(AggregateStatus::Success);
        }
        job.process_next_event().await;
    }
}
