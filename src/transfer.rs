//! Transfer delegate contract and the HTTP production delegate
//!
//! A [`TransferDelegate`] performs the actual bytes-over-the-wire exchange
//! for one or more items. The engine hands it a batch of requests plus a
//! [`TransferCompletions`] sink wired to the dispatching job; the delegate
//! must deliver exactly one [`TransferOutcome`] per requested item, in any
//! order, with the item's content staged (and flushed) at the request's
//! destination path before a success outcome is reported.

use std::path::PathBuf;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use url::Url;

use crate::checksum::Checksum;
use crate::types::SyncError;

/// Request to fetch content for one item.
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    /// Normalized relative path (the item's identity)
    pub path: String,
    /// Expected content size in bytes
    pub size: u64,
    /// Remote revision tag the orchestrator discovered
    pub etag: String,
    /// Expected content checksum, verified while streaming when present
    pub checksum: Option<Checksum>,
    /// Staging path the delegate writes content to
    pub destination: PathBuf,
}

/// Successful transfer details.
#[derive(Clone, Debug, Default)]
pub struct TransferSuccess {
    /// Bytes written to the destination
    pub bytes: u64,
    /// Revision tag observed on the response, if the transport exposes one
    pub etag: Option<String>,
}

/// Per-item terminal result reported by a delegate or decrypt path.
#[derive(Clone, Debug)]
pub struct TransferOutcome {
    /// Item path the outcome belongs to
    pub path: String,
    /// Transfer result; failures are item-local and never abort siblings
    pub result: Result<TransferSuccess, SyncError>,
}

/// Completion sink handed to a delegate for one dispatched batch.
///
/// Outcomes are routed to exactly the job instance that dispatched the batch
/// (identity-keyed, not broadcast). Delivering after the job has shut down is
/// harmless and logged at debug level.
#[derive(Clone)]
pub struct TransferCompletions {
    tx: mpsc::UnboundedSender<TransferOutcome>,
}

impl TransferCompletions {
    pub(crate) fn new(tx: mpsc::UnboundedSender<TransferOutcome>) -> Self {
        Self { tx }
    }

    /// Deliver one item's terminal outcome.
    pub fn complete(&self, outcome: TransferOutcome) {
        if self.tx.send(outcome).is_err() {
            tracing::debug!("transfer outcome delivered after job shutdown, dropping");
        }
    }

    /// Shorthand for a successful completion.
    pub fn success(&self, path: impl Into<String>, success: TransferSuccess) {
        self.complete(TransferOutcome {
            path: path.into(),
            result: Ok(success),
        });
    }

    /// Shorthand for a failed completion.
    pub fn failure(&self, path: impl Into<String>, error: SyncError) {
        self.complete(TransferOutcome {
            path: path.into(),
            result: Err(error),
        });
    }
}

/// Abstraction over content transfer, enabling bulk-capable transports and
/// testability.
#[async_trait]
pub trait TransferDelegate: Send + Sync {
    /// Fetch content for one or more items, combined into a single physical
    /// request where the transport supports it.
    ///
    /// Contract: exactly one outcome per request is delivered through
    /// `completions`, in arbitrary order; content for a success outcome is
    /// fully written and flushed at the request's destination.
    async fn fetch(&self, requests: Vec<DownloadRequest>, completions: TransferCompletions);
}

/// Production [`TransferDelegate`] over plain HTTP.
///
/// The transport has no multi-fetch endpoint, so a multi-item batch degrades
/// to pipelined per-item GETs with identical per-item semantics; outcomes are
/// delivered as responses arrive.
pub struct HttpTransferDelegate {
    http: reqwest::Client,
    base_url: Url,
    concurrency: usize,
}

impl HttpTransferDelegate {
    /// Create a delegate fetching items relative to `base_url`.
    ///
    /// `base_url` should end with a slash so item paths join below it.
    pub fn new(base_url: Url) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a delegate using a preconfigured HTTP client.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            concurrency: 4,
        }
    }

    /// Set how many GETs of one batch run concurrently.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    fn item_url(&self, path: &str) -> Result<Url, SyncError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| SyncError::protocol(format!("invalid item url for {path}: {e}")))
    }

    async fn fetch_one(&self, request: &DownloadRequest) -> Result<TransferSuccess, SyncError> {
        let url = self.item_url(&request.path)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SyncError::network(e.to_string()))?;

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());

        if let Some(parent) = request.destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::network(format!("create staging directory: {e}")))?;
        }
        let mut file = tokio::fs::File::create(&request.destination)
            .await
            .map_err(|e| SyncError::network(format!("create staging file: {e}")))?;

        let mut hasher = request.checksum.as_ref().map(|c| c.hasher());
        let mut bytes = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| SyncError::network(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| SyncError::network(format!("write staging file: {e}")))?;
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&chunk);
            }
            bytes += chunk.len() as u64;
        }

        // Durable before the outcome is reported; the store commits metadata
        // on the strength of this.
        file.flush()
            .await
            .and(file.sync_all().await)
            .map_err(|e| SyncError::network(format!("flush staging file: {e}")))?;

        if let (Some(expected), Some(hasher)) = (&request.checksum, hasher) {
            let actual = hasher.finish();
            if actual != expected.hex() {
                let _ = tokio::fs::remove_file(&request.destination).await;
                return Err(SyncError::protocol(format!(
                    "checksum mismatch for {}: expected {}, got {}:{}",
                    request.path,
                    expected,
                    expected.algo(),
                    actual
                )));
            }
        }

        Ok(TransferSuccess { bytes, etag })
    }
}

#[async_trait]
impl TransferDelegate for HttpTransferDelegate {
    async fn fetch(&self, requests: Vec<DownloadRequest>, completions: TransferCompletions) {
        tracing::debug!(items = requests.len(), "serving bulk request as pipelined GETs");
        futures::stream::iter(requests.into_iter().map(|request| {
            let completions = completions.clone();
            async move {
                let result = self.fetch_one(&request).await;
                if let Err(error) = &result {
                    tracing::warn!(path = %request.path, error = %error, "item transfer failed");
                }
                completions.complete(TransferOutcome {
                    path: request.path,
                    result,
                });
            }
        }))
        .buffer_unordered(self.concurrency)
        .collect::<Vec<()>>()
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request_for(dir: &std::path::Path, item_path: &str) -> DownloadRequest {
        DownloadRequest {
            path: item_path.to_string(),
            size: 0,
            etag: "etag-1".to_string(),
            checksum: None,
            destination: dir.join(item_path),
        }
    }

    async fn delegate_for(server: &MockServer) -> HttpTransferDelegate {
        let base = Url::parse(&format!("{}/files/", server.uri())).unwrap();
        HttpTransferDelegate::new(base)
    }

    #[tokio::test]
    async fn fetch_stages_content_and_reports_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/docs/a.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"hello")
                    .insert_header("etag", "\"rev-2\""),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let delegate = delegate_for(&server).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        delegate
            .fetch(
                vec![request_for(dir.path(), "docs/a.txt")],
                TransferCompletions::new(tx),
            )
            .await;

        let outcome = rx.recv().await.unwrap();
        assert_eq!(outcome.path, "docs/a.txt");
        let success = outcome.result.unwrap();
        assert_eq!(success.bytes, 5);
        assert_eq!(success.etag.as_deref(), Some("rev-2"));
        assert_eq!(
            std::fs::read(dir.path().join("docs/a.txt")).unwrap(),
            b"hello"
        );
    }

    #[tokio::test]
    async fn missing_item_is_a_network_error() {
        let server = MockServer::start().await;

        let dir = tempfile::tempdir().unwrap();
        let delegate = delegate_for(&server).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        delegate
            .fetch(
                vec![request_for(dir.path(), "gone.txt")],
                TransferCompletions::new(tx),
            )
            .await;

        let outcome = rx.recv().await.unwrap();
        let error = outcome.result.unwrap_err();
        assert_eq!(error.kind, ErrorKind::Network);
    }

    #[tokio::test]
    async fn checksum_mismatch_is_a_protocol_error_and_discards_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/b.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tampered"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let delegate = delegate_for(&server).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut request = request_for(dir.path(), "b.bin");
        // MD5 of "hello" -- not what the server returns
        request.checksum =
            Some(Checksum::parse("MD5:5d41402abc4b2a76b9719d911017c592").unwrap());

        delegate.fetch(vec![request], TransferCompletions::new(tx)).await;

        let outcome = rx.recv().await.unwrap();
        assert_eq!(outcome.result.unwrap_err().kind, ErrorKind::Protocol);
        assert!(!dir.path().join("b.bin").exists());
    }

    #[tokio::test]
    async fn batch_delivers_one_outcome_per_item() {
        let server = MockServer::start().await;
        for name in ["a", "b", "c"] {
            Mock::given(method("GET"))
                .and(path(format!("/files/{name}")))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(name.as_bytes()))
                .mount(&server)
                .await;
        }

        let dir = tempfile::tempdir().unwrap();
        let delegate = delegate_for(&server).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let requests = ["a", "b", "c"]
            .iter()
            .map(|name| request_for(dir.path(), name))
            .collect();
        delegate.fetch(requests, TransferCompletions::new(tx)).await;

        let mut seen = Vec::new();
        while let Ok(outcome) = rx.try_recv() {
            assert!(outcome.result.is_ok());
            seen.push(outcome.path);
        }
        seen.sort();
        assert_eq!(seen, ["a", "b", "c"]);
    }
}
