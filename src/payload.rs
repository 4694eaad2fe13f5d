//! Submission Payload
//!
//! The JSON body exchanged between the wizard and `/api/submit`.
//! Both sides serialize through these types so the shape lives in
//! one place.

use serde::{Deserialize, Serialize};

use crate::form::IncidentRecord;

/// Flat card body posted to the submission endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmissionPayload {
    #[serde(rename = "unsafe")]
    pub unsafe_kind: String,
    pub location: String,
    pub observer_name: String,
    pub company: String,
    pub position: String,
    pub date: String,
    pub time: String,
    pub incident_details: String,
    pub corrective_actions: String,
    pub life_saving_rules: Vec<String>,
    pub other_life_saving_rules: String,
    pub causal_factors: Vec<String>,
    pub other_causal_factors: String,
    pub stop_work_enforced: String,
    pub stop_work_actions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

impl SubmissionPayload {
    /// Flatten a record. Local (not yet uploaded) evidence has no URL
    /// and is left out.
    pub fn from_record(record: &IncidentRecord) -> Self {
        Self {
            unsafe_kind: record.unsafe_kind.map(|k| k.as_str().to_string()).unwrap_or_default(),
            location: record.location.trim().to_string(),
            observer_name: record.observer_name.trim().to_string(),
            company: record.company.trim().to_string(),
            position: record.position.trim().to_string(),
            date: record.date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
            time: record.time.map(|t| t.format("%H:%M").to_string()).unwrap_or_default(),
            incident_details: record.incident_details.clone(),
            corrective_actions: record.corrective_actions.clone(),
            life_saving_rules: record.life_saving_rules.as_slice().to_vec(),
            other_life_saving_rules: record.other_life_saving_rules.clone(),
            causal_factors: record.causal_factors.as_slice().to_vec(),
            other_causal_factors: record.other_causal_factors.clone(),
            stop_work_enforced: record.stop_work.map(|s| s.as_str().to_string()).unwrap_or_default(),
            stop_work_actions: record.stop_work_actions.clone(),
            file_url: record.evidence.as_ref().and_then(|e| e.url()).map(str::to_string),
        }
    }

    /// Server-side backstop: the few fields the email cannot do without.
    /// Returns the message for the first one missing.
    pub fn missing_required(&self) -> Option<&'static str> {
        if self.observer_name.trim().is_empty() {
            return Some("Observer name is required");
        }
        if self.incident_details.trim().is_empty() {
            return Some("Incident details are required");
        }
        if self.corrective_actions.trim().is_empty() {
            return Some("Corrective actions are required");
        }
        None
    }

    /// `fileUrl` with blank values treated as absent
    pub fn evidence_url(&self) -> Option<&str> {
        self.file_url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// Successful submission reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub id: String,
}

/// Error reply shared by every endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}
