//! Filesystem evidence store

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::EvidenceStore;
use crate::error::StoreError;
use crate::signal::FrameRef;
use crate::violation::EvidenceRef;

/// Writes evidence images to `<root>/<session_id>/<timestamp>_<id>.<ext>`
///
/// The extension follows the frame's content type, defaulting to `jpg`. The
/// returned reference is the file path.
#[derive(Debug, Clone)]
pub struct FileEvidenceStore {
    root: PathBuf,
}

impl FileEvidenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one session's evidence
    ///
    /// Anything outside `[A-Za-z0-9_-]` in the id is replaced so a session id
    /// can never escape the root.
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        let sanitized: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let name = if sanitized.is_empty() {
            "_".to_string()
        } else {
            sanitized
        };
        self.root.join(name)
    }
}

#[async_trait]
impl EvidenceStore for FileEvidenceStore {
    async fn save_evidence(
        &self,
        session_id: &str,
        violation_id: Uuid,
        frame: &FrameRef,
    ) -> Result<EvidenceRef, StoreError> {
        let dir = self.session_dir(session_id);
        tokio::fs::create_dir_all(&dir).await?;

        let simple = violation_id.simple().to_string();
        let file_name = format!(
            "{}_{}.{}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            &simple[..8],
            extension(frame.content_type())
        );
        let path = dir.join(file_name);
        tokio::fs::write(&path, frame.bytes()).await?;

        Ok(EvidenceRef::new(path.to_string_lossy().into_owned()))
    }
}

fn extension(content_type: Option<&str>) -> &'static str {
    match content_type.map(str::to_ascii_lowercase).as_deref() {
        Some("image/png") => "png",
        Some("image/webp") => "webp",
        Some("image/gif") => "gif",
        Some("image/bmp") => "bmp",
        _ => "jpg",
    }
}
