//! HTTP Backend
//!
//! Two endpoints: `/api/blob-upload` hands out upload tokens and
//! `/api/submit` emails a finished card. Handlers are stateless; the
//! shared state is configuration plus the mail and storage clients.

mod blob_upload;
mod submit;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::notify::{HttpMailer, Mailer, NotificationComposer, Notifier, SubmitError};
use crate::payload::ErrorBody;
use crate::storage::{BlobStore, HttpBlobStore, UploadSigner};

/// Error reply of any endpoint: a status and an `{error}` body
#[derive(Debug)]
pub struct ServerError {
    status: StatusCode,
    message: String,
}

impl ServerError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn method_not_allowed(method: &axum::http::Method) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, format!("Method {} not allowed", method))
    }
}

impl From<SubmitError> for ServerError {
    fn from(err: SubmitError) -> Self {
        let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request failed ({}): {}", self.status, self.message);
        } else {
            warn!("Request rejected ({}): {}", self.status, self.message);
        }
        let mut response = (self.status, Json(ErrorBody::new(self.message))).into_response();
        if self.status == StatusCode::METHOD_NOT_ALLOWED {
            response.headers_mut().insert(header::ALLOW, HeaderValue::from_static("POST"));
        }
        response
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub notifier: Arc<Notifier>,
    /// Absent when no storage token is configured
    pub signer: Option<Arc<UploadSigner>>,
}

impl AppState {
    pub fn new(config: ServerConfig, mailer: Arc<dyn Mailer>, blobs: Arc<dyn BlobStore>) -> Self {
        let notifier = Notifier::new(mailer, blobs, NotificationComposer::new(config.sender.clone()))
            .with_evidence_hosts(config.evidence_hosts.clone());
        let signer = config
            .blob_token
            .as_ref()
            .map(|token| Arc::new(UploadSigner::new(token.clone(), config.upload_token_ttl)));
        Self {
            config: Arc::new(config),
            notifier: Arc::new(notifier),
            signer,
        }
    }

    /// State backed by the real mail provider and object storage
    pub fn from_config(config: ServerConfig) -> Self {
        let mailer = Arc::new(HttpMailer::new(config.mail_api_url.clone(), config.http_timeout));
        let blobs = Arc::new(HttpBlobStore::new(
            config.blob_api_url.clone(),
            config.blob_token.clone(),
            config.http_timeout,
        ));
        Self::new(config, mailer, blobs)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/submit", any(submit::submit_handler))
        .route("/api/blob-upload", any(blob_upload::blob_upload_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    if config.mail_settings().is_err() {
        warn!("Mail API key or recipient missing; submissions will be refused until configured");
    }
    if config.blob_token.is_none() {
        warn!("Storage token missing; evidence uploads will be refused");
    }

    let addr = config.bind_addr.clone();
    let app = router(AppState::from_config(config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🚀 HOC backend listening at http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
