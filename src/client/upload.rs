//! Upload Coordinator
//!
//! Two-hop upload: a token from the backend, then the bytes straight to
//! object storage. The backend never sees the file during upload.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::{ApiError, HocApi};
use crate::form::{EvidenceFile, MAX_EVIDENCE_BYTES};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("File is {size} bytes; the limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
    #[error("Unsupported file type '{0}'. Please upload a PNG, JPG, GIF, or SVG file.")]
    UnsupportedType(String),
    #[error("Upload was not authorized: {0}")]
    Rejected(String),
    #[error("Upload failed: {0}")]
    Network(String),
}

pub struct UploadCoordinator {
    api: Arc<dyn HocApi>,
}

impl UploadCoordinator {
    pub fn new(api: Arc<dyn HocApi>) -> Self {
        Self { api }
    }

    /// Upload one evidence file and return its public URL
    pub async fn upload(&self, file: &EvidenceFile) -> Result<String, UploadError> {
        check_file(file)?;

        let pathname = storage_pathname(&file.name);
        let token = self.api.request_upload_token(&pathname).await.map_err(|e| match e {
            ApiError::Status { message, .. } => UploadError::Rejected(message),
            ApiError::Transport(message) => UploadError::Network(message),
        })?;

        let url = self
            .api
            .put_blob(&token, &pathname, &file.content_type, file.data.clone())
            .await
            .map_err(|e| {
                warn!("Evidence transfer failed: {}", e);
                UploadError::Network(e.to_string())
            })?;

        info!("Evidence '{}' uploaded to {}", file.name, url);
        Ok(url)
    }
}

/// Size and type checks that need no network
pub fn check_file(file: &EvidenceFile) -> Result<(), UploadError> {
    if !file.content_type.starts_with("image/") || !file.is_accepted_type() {
        return Err(UploadError::UnsupportedType(file.content_type.clone()));
    }
    if file.size() > MAX_EVIDENCE_BYTES {
        return Err(UploadError::TooLarge {
            size: file.size(),
            limit: MAX_EVIDENCE_BYTES,
        });
    }
    Ok(())
}

/// `Site photo (1).png` -> `evidence/Site-photo--1-.png`
fn storage_pathname(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '-' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "evidence/upload".to_string()
    } else {
        format!("evidence/{}", cleaned)
    }
}
