//! Directory job: ordered children, rolled-up status

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::AggregateStatus;

use super::{JobParallelism, JobState, PropagationJob};

/// Container job owning the ordered child jobs of one directory level.
///
/// Children are scheduled in insertion order; a child declaring
/// [`JobParallelism::WaitForFinished`] blocks advancement of later siblings
/// until it finishes. The directory's aggregate is Error if any child ended
/// Error, Aborted if any child was cancelled, else Success.
pub struct DirectoryJob {
    state: JobState,
    parallelism: JobParallelism,
    children: Vec<Box<dyn PropagationJob>>,
    aggregate: Option<AggregateStatus>,
}

impl DirectoryJob {
    /// Create an empty directory job with the given parallelism declaration.
    pub fn new(parallelism: JobParallelism) -> Self {
        Self {
            state: JobState::NotStarted,
            parallelism,
            children: Vec::new(),
            aggregate: None,
        }
    }

    /// Append a child job. Children run in insertion order.
    pub fn push(&mut self, child: Box<dyn PropagationJob>) -> Result<()> {
        if self.state == JobState::Finished {
            return Err(Error::JobFinished("directory".to_string()));
        }
        self.children.push(child);
        Ok(())
    }

    /// Number of child jobs.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether this directory has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn finalize_if_done(&mut self) {
        if self.state == JobState::Finished {
            return;
        }
        if self
            .children
            .iter()
            .any(|child| child.state() != JobState::Finished)
        {
            return;
        }
        let mut status = AggregateStatus::Success;
        for child in &self.children {
            match child.aggregate_status() {
                Some(AggregateStatus::Aborted) => {
                    status = AggregateStatus::Aborted;
                    break;
                }
                Some(AggregateStatus::Error) => status = AggregateStatus::Error,
                _ => {}
            }
        }
        self.aggregate = Some(status);
        self.state = JobState::Finished;
        tracing::info!(
            status = ?status,
            children = self.children.len(),
            "directory job finished"
        );
    }
}

#[async_trait]
impl PropagationJob for DirectoryJob {
    fn schedule_self_or_child(&mut self) -> bool {
        if self.state == JobState::Finished {
            return false;
        }
        for child in self.children.iter_mut() {
            if child.state() == JobState::Finished {
                continue;
            }
            if child.schedule_self_or_child() {
                self.state = JobState::Running;
                return true;
            }
            // An exclusive child holds back every later sibling until it is
            // done, even while it dispatches nothing new.
            if child.parallelism() == JobParallelism::WaitForFinished
                && child.state() != JobState::Finished
            {
                return false;
            }
        }
        self.finalize_if_done();
        false
    }

    fn parallelism(&self) -> JobParallelism {
        self.parallelism
    }

    fn state(&self) -> JobState {
        self.state
    }

    fn aggregate_status(&self) -> Option<AggregateStatus> {
        self.aggregate
    }

    async fn process_next_event(&mut self) {
        if self.state != JobState::Running {
            return;
        }
        let pending: Vec<_> = self
            .children
            .iter_mut()
            .filter(|child| child.state() == JobState::Running)
            .map(|child| child.process_next_event())
            .collect();
        if pending.is_empty() {
            return;
        }
        // First child event wins; the driver reschedules before the next one
        let _ = futures::future::select_all(pending).await;
    }
}
