//! Implements AttachmentStore on the local file system.
//! One directory per ticket: data/attachments/{ticket_id}/. Blobs are written
//! to a temp file and renamed into place, so a half-written file is never visible.

use crate::domain::{AttachmentRef, DomainError};
use crate::ports::AttachmentStore;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// File-system attachment store.
pub struct FsAttachmentStore {
    base_dir: PathBuf,
    seq: AtomicU64,
}

impl FsAttachmentStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            seq: AtomicU64::new(0),
        }
    }

    /// Keep letters, digits, `.`, `-`, `_`; everything else becomes `_`.
    fn sanitize(filename: &str) -> String {
        let cleaned: String = filename
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let cleaned = cleaned.trim_start_matches('.');
        if cleaned.is_empty() {
            "file".to_string()
        } else {
            cleaned.to_string()
        }
    }

    /// Resolve a store key, refusing anything that escapes the base directory.
    fn resolve(&self, store_key: &str) -> Result<PathBuf, DomainError> {
        let key = Path::new(store_key);
        if key
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(DomainError::Attachment(format!(
                "invalid store key: {}",
                store_key
            )));
        }
        Ok(self.base_dir.join(key))
    }
}

#[async_trait::async_trait]
impl AttachmentStore for FsAttachmentStore {
    async fn put(
        &self,
        ticket_id: i64,
        filename: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<AttachmentRef, DomainError> {
        let dir = self.base_dir.join(ticket_id.to_string());
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| DomainError::Attachment(e.to_string()))?;

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let stamp = chrono::Utc::now().timestamp_millis();
        let name = format!("{}-{}-{}", stamp, seq, Self::sanitize(filename));
        let dest = dir.join(&name);
        let temp = dir.join(format!(".{}.tmp", name));

        let mut f = fs::File::create(&temp)
            .await
            .map_err(|e| DomainError::Attachment(format!("create temp file: {}", e)))?;
        f.write_all(bytes)
            .await
            .map_err(|e| DomainError::Attachment(format!("write temp file: {}", e)))?;
        f.sync_all()
            .await
            .map_err(|e| DomainError::Attachment(format!("sync temp file: {}", e)))?;
        drop(f);
        fs::rename(&temp, &dest)
            .await
            .map_err(|e| DomainError::Attachment(format!("atomic rename failed: {}", e)))?;

        info!(
            path = %dest.display(),
            ticket_id,
            size = bytes.len(),
            "attachment stored"
        );

        Ok(AttachmentRef {
            store_key: format!("{}/{}", ticket_id, name),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            size: bytes.len() as u64,
        })
    }

    async fn get(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, DomainError> {
        let path = self.resolve(&attachment.store_key)?;
        fs::read(&path)
            .await
            .map_err(|e| DomainError::Attachment(format!("{}: {}", path.display(), e)))
    }
}
