use axum::{
    body::Bytes,
    extract::State,
    http::Method,
    Json,
};
use tracing::debug;

use super::{AppState, ServerError};
use crate::notify::SubmitError;
use crate::payload::{SubmissionPayload, SubmitResponse};

/// `POST /api/submit`
///
/// Method first, then configuration, then the body, so a misconfigured
/// server never reaches the mail provider.
pub(super) async fn submit_handler(
    State(state): State<AppState>,
    method: Method,
    body: Bytes,
) -> Result<Json<SubmitResponse>, ServerError> {
    if method != Method::POST {
        return Err(ServerError::method_not_allowed(&method));
    }

    let settings = state.config.mail_settings().map_err(SubmitError::from)?;

    let payload: SubmissionPayload =
        serde_json::from_slice(&body).map_err(|e| SubmitError::InvalidBody(e.to_string()))?;
    debug!("Submission received from '{}'", payload.observer_name);

    let id = state.notifier.deliver(&settings, &payload).await?;
    Ok(Json(SubmitResponse { success: true, id }))
}
