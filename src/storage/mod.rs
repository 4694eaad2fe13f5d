//! Object Storage
//!
//! Access to the temporary evidence blobs: reading one back to attach
//! it to the email, and deleting it once the email went out. Uploads
//! never pass through here; the client sends bytes straight to storage
//! with a token from [`token::UploadSigner`].

pub mod token;

pub use token::{BlobUploadEvent, BlobUploadReply, ClientTokenClaims, UploadSigner};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::form::MAX_EVIDENCE_BYTES;
use crate::utils::http_client;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("storage responded {status}: {message}")]
    Status { status: u16, message: String },
    #[error("storage request failed: {0}")]
    Transport(String),
    #[error("storage token is not configured")]
    NotConfigured,
    #[error("blob exceeds {limit} bytes")]
    TooLarge { limit: u64 },
}

impl From<reqwest::Error> for BlobError {
    fn from(err: reqwest::Error) -> Self {
        BlobError::Transport(err.to_string())
    }
}

/// Bytes of a stored blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBlob {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Download a blob by its public URL
    async fn fetch(&self, url: &str) -> Result<FetchedBlob, BlobError>;

    /// Remove a blob by its public URL
    async fn delete(&self, url: &str) -> Result<(), BlobError>;
}

/// Blob store speaking the hosted storage HTTP API
pub struct HttpBlobStore {
    client: Client,
    api_url: String,
    token: Option<String>,
    max_bytes: u64,
}

impl HttpBlobStore {
    pub fn new(api_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            api_url: api_url.into(),
            token,
            max_bytes: MAX_EVIDENCE_BYTES,
        }
    }

    /// Largest blob `fetch` will read
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn fetch(&self, url: &str) -> Result<FetchedBlob, BlobError> {
        debug!("Fetching blob {}", url);
        let mut res = self.client.get(url).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(BlobError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }
        let content_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let limit = self.max_bytes;
        if res.content_length().is_some_and(|len| len > limit) {
            return Err(BlobError::TooLarge { limit });
        }

        // Content-Length may be absent or wrong; count what actually arrives
        let mut data = Vec::new();
        while let Some(chunk) = res.chunk().await? {
            if data.len() as u64 + chunk.len() as u64 > limit {
                return Err(BlobError::TooLarge { limit });
            }
            data.extend_from_slice(&chunk);
        }
        Ok(FetchedBlob { data, content_type })
    }

    async fn delete(&self, url: &str) -> Result<(), BlobError> {
        let token = self.token.as_deref().ok_or(BlobError::NotConfigured)?;
        debug!("Deleting blob {}", url);
        let res = self
            .client
            .post(format!("{}/delete", self.api_url.trim_end_matches('/')))
            .bearer_auth(token)
            .json(&json!({ "urls": [url] }))
            .send()
            .await?;
        let status = res.status();
        if status.is_success() {
            return Ok(());
        }
        let message = res.text().await.unwrap_or_default();
        Err(BlobError::Status {
            status: status.as_u16(),
            message,
        })
    }
}
