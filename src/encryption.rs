//! End-to-end-encryption routing
//!
//! Items living in an end-to-end-encrypted folder cannot join bulk requests:
//! the bulk optimization operates on plaintext-compatible transport
//! semantics, so encrypted items are fetched and decrypted one at a time
//! through an [`EncryptionRouter`].

use async_trait::async_trait;

use crate::transfer::{DownloadRequest, TransferSuccess};
use crate::types::SyncError;

/// Folder-encryption lookup and single-item decrypt path.
#[async_trait]
pub trait EncryptionRouter: Send + Sync {
    /// Whether the folder containing `path` is end-to-end encrypted.
    ///
    /// May involve a metadata lookup against the server; only the asking
    /// item's progress is suspended while it runs.
    async fn is_folder_encrypted(&self, path: &str) -> Result<bool, SyncError>;

    /// Download and decrypt one item, staging the plaintext (flushed) at the
    /// request's destination.
    async fn download_encrypted(
        &self,
        request: DownloadRequest,
    ) -> Result<TransferSuccess, SyncError>;
}

/// Router for deployments without end-to-end encryption.
///
/// Answers "not encrypted" for every folder, so all items take the bulk
/// path; a decrypt request can only be a wiring mistake and fails.
pub struct PlaintextRouter;

#[async_trait]
impl EncryptionRouter for PlaintextRouter {
    async fn is_folder_encrypted(&self, _path: &str) -> Result<bool, SyncError> {
        Ok(false)
    }

    async fn download_encrypted(
        &self,
        request: DownloadRequest,
    ) -> Result<TransferSuccess, SyncError> {
        Err(SyncError::decryption(format!(
            "end-to-end encryption is not configured, cannot decrypt {}",
            request.path
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use std::path::PathBuf;

    #[tokio::test]
    async fn plaintext_router_reports_everything_unencrypted() {
        let router = PlaintextRouter;
        assert!(!router.is_folder_encrypted("docs/a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn plaintext_router_rejects_decrypt_requests() {
        let router = PlaintextRouter;
        let request = DownloadRequest {
            path: "vault/d.bin".to_string(),
            size: 1,
            etag: "etag-1".to_string(),
            checksum: None,
            destination: PathBuf::from("/tmp/d.bin"),
        };

        let error = router.download_encrypted(request).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::Decryption);
    }
}
