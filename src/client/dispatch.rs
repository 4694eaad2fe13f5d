//! Submission Dispatcher
//!
//! Runs the submit pipeline against a [`FormStore`]: full validation,
//! evidence upload when needed, then the POST. Every boundary result is
//! fed back into the store so its status always reflects where the
//! submission stands.

use chrono::{Local, NaiveDate};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::{ApiError, HocApi, UploadCoordinator, UploadError};
use crate::form::{validate_all, Evidence, FormAction, FormStore, ValidationErrors};
use crate::payload::SubmissionPayload;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("This card has already been submitted")]
    AlreadySubmitted,
    #[error("A submission is already in progress")]
    InFlight,
    #[error("Please correct the form: {0}")]
    Validation(ValidationErrors),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("Could not reach the server: {0}")]
    Network(String),
}

impl From<ApiError> for SubmissionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Status { status, message } => SubmissionError::Rejected { status, message },
            ApiError::Transport(message) => SubmissionError::Network(message),
        }
    }
}

pub struct SubmissionDispatcher {
    api: Arc<dyn HocApi>,
    uploader: UploadCoordinator,
}

impl SubmissionDispatcher {
    pub fn new(api: Arc<dyn HocApi>) -> Self {
        Self {
            uploader: UploadCoordinator::new(api.clone()),
            api,
        }
    }

    pub async fn submit(&self, store: &mut FormStore) -> Result<String, SubmissionError> {
        self.submit_on(store, Local::now().date_naive()).await
    }

    /// Submit with an explicit "today" for the date check
    pub async fn submit_on(&self, store: &mut FormStore, today: NaiveDate) -> Result<String, SubmissionError> {
        if store.state().is_closed() {
            return Err(SubmissionError::AlreadySubmitted);
        }
        if store.state().status.is_busy() {
            return Err(SubmissionError::InFlight);
        }

        let errors = validate_all(store.record(), today);
        if !errors.is_empty() {
            store.apply(FormAction::ShowErrors(errors.clone()));
            return Err(SubmissionError::Validation(errors));
        }

        // Evidence uploaded by an earlier attempt keeps its URL
        if let Some(Evidence::Local(file)) = store.record().evidence.clone() {
            store.apply(FormAction::UploadStarted);
            match self.uploader.upload(&file).await {
                Ok(url) => store.apply(FormAction::UploadCompleted { url }),
                Err(e) => {
                    warn!("Evidence upload failed: {}", e);
                    store.apply(FormAction::SubmitFailed { message: e.to_string() });
                    return Err(e.into());
                }
            }
        }

        store.apply(FormAction::SendStarted);
        let payload = SubmissionPayload::from_record(store.record());
        match self.api.post_submission(&payload).await {
            Ok(id) => {
                info!("HOC card submitted (id {})", id);
                store.apply(FormAction::SubmitSucceeded { id: id.clone() });
                Ok(id)
            }
            Err(e) => {
                let err = SubmissionError::from(e);
                warn!("HOC card submission failed: {}", err);
                store.apply(FormAction::SubmitFailed { message: err.to_string() });
                Err(err)
            }
        }
    }
}
