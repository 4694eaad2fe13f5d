use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    Json,
};
use chrono::Utc;
use tracing::info;

use super::{AppState, ServerError};
use crate::storage::{BlobUploadEvent, BlobUploadReply};

/// `POST /api/blob-upload`: token requests and upload-completed callbacks
pub(super) async fn blob_upload_handler(
    State(state): State<AppState>,
    method: Method,
    body: Bytes,
) -> Result<Json<BlobUploadReply>, ServerError> {
    if method != Method::POST {
        return Err(ServerError::method_not_allowed(&method));
    }

    let signer = state.signer.as_ref().ok_or_else(|| {
        ServerError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Server configuration error: HOC_BLOB_READ_WRITE_TOKEN is not set",
        )
    })?;

    let event: BlobUploadEvent = serde_json::from_slice(&body)
        .map_err(|e| ServerError::new(StatusCode::BAD_REQUEST, format!("Invalid upload request: {}", e)))?;

    match event {
        BlobUploadEvent::GenerateClientToken(request) => {
            let (client_token, claims) = signer
                .issue(&request.pathname, Utc::now())
                .map_err(|e| ServerError::new(StatusCode::BAD_REQUEST, e.to_string()))?;
            info!("Issued upload token for {}", claims.pathname);
            Ok(Json(BlobUploadReply::ClientToken { client_token }))
        }
        BlobUploadEvent::UploadCompleted(completed) => {
            info!("Upload success: {}", completed.blob.url);
            Ok(Json(BlobUploadReply::UploadCompleted {
                response: "ok".to_string(),
            }))
        }
    }
}
