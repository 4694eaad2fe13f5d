//! Client Module
//!
//! The wizard's side of the wire: uploading evidence and posting the
//! finished card. Network access goes through [`HocApi`] so the
//! coordinator and dispatcher can be driven by a mock in tests.

pub mod dispatch;
pub mod upload;

pub use dispatch::{SubmissionDispatcher, SubmissionError};
pub use upload::{UploadCoordinator, UploadError};

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::payload::{ErrorBody, SubmissionPayload, SubmitResponse};
use crate::utils::http_client;
use crate::storage::token::{BlobUploadEvent, BlobUploadReply, TokenRequest};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The server answered with a non-2xx status
    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },
    /// No usable answer
    #[error("{0}")]
    Transport(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

#[async_trait]
pub trait HocApi: Send + Sync {
    /// Ask the backend for a client token allowing one upload of `pathname`
    async fn request_upload_token(&self, pathname: &str) -> Result<String, ApiError>;

    /// Put bytes straight into object storage, returning the public URL
    async fn put_blob(&self, token: &str, pathname: &str, content_type: &str, data: Vec<u8>)
        -> Result<String, ApiError>;

    /// Post a finished card, returning the confirmation id
    async fn post_submission(&self, payload: &SubmissionPayload) -> Result<String, ApiError>;
}

#[derive(Deserialize)]
struct PutBlobResponse {
    url: String,
}

/// [`HocApi`] over HTTP
pub struct HttpHocApi {
    client: Client,
    backend_url: String,
    storage_url: String,
}

impl HttpHocApi {
    pub fn new(backend_url: impl Into<String>, storage_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            backend_url: backend_url.into(),
            storage_url: storage_url.into(),
        }
    }

    fn backend(&self, path: &str) -> String {
        format!("{}{}", self.backend_url.trim_end_matches('/'), path)
    }
}

/// Turn a non-2xx reply into [`ApiError::Status`], preferring the
/// server's own `error` message
async fn check(res: Response) -> Result<Response, ApiError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let text = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.error)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl HocApi for HttpHocApi {
    async fn request_upload_token(&self, pathname: &str) -> Result<String, ApiError> {
        let event = BlobUploadEvent::GenerateClientToken(TokenRequest {
            pathname: pathname.to_string(),
            callback_url: None,
            client_payload: None,
            multipart: false,
        });
        let res = self.client.post(self.backend("/api/blob-upload")).json(&event).send().await?;
        match check(res).await?.json::<BlobUploadReply>().await? {
            BlobUploadReply::ClientToken { client_token } => Ok(client_token),
            other => Err(ApiError::Transport(format!("unexpected token reply: {:?}", other))),
        }
    }

    async fn put_blob(
        &self,
        token: &str,
        pathname: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<String, ApiError> {
        let url = format!("{}/{}", self.storage_url.trim_end_matches('/'), pathname);
        debug!("Uploading {} bytes to {}", data.len(), url);
        let res = self
            .client
            .put(url)
            .bearer_auth(token)
            .header("x-content-type", content_type)
            .body(data)
            .send()
            .await?;
        let stored: PutBlobResponse = check(res).await?.json().await?;
        Ok(stored.url)
    }

    async fn post_submission(&self, payload: &SubmissionPayload) -> Result<String, ApiError> {
        let res = self.client.post(self.backend("/api/submit")).json(payload).send().await?;
        let reply: SubmitResponse = check(res).await?.json().await?;
        Ok(reply.id)
    }
}
