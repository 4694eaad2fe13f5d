//! Notification Composer
//!
//! Turns a submitted card into an HTML email, attaches the evidence
//! image when it can be fetched, sends it, and removes the temporary
//! blob afterwards.

pub mod mail;

pub use mail::{Attachment, HttpMailer, MailError, Mailer, OutboundEmail};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Url;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{host_allowed, ConfigError, MailSettings};
use crate::form::TAG_OTHERS;
use crate::payload::SubmissionPayload;
use crate::storage::{BlobError, BlobStore};
use crate::utils::{single_line, truncate_text, BestEffort};

const SUBJECT_MAX_BYTES: usize = 120;

/// Why a submission was not delivered
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Server configuration error: {0}")]
    Configuration(String),
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error("{0}")]
    MissingField(&'static str),
    #[error("Email service authentication failed. Check the mail API key. ({0})")]
    MailAuth(String),
    #[error("Email provider rejected the message: {0}")]
    MailProvider(String),
    #[error("{0}")]
    Unexpected(String),
}

impl SubmitError {
    /// HTTP status the endpoint answers with
    pub fn status_code(&self) -> u16 {
        match self {
            SubmitError::Configuration(_) | SubmitError::Unexpected(_) => 500,
            SubmitError::InvalidBody(_)
            | SubmitError::MissingField(_)
            | SubmitError::MailAuth(_)
            | SubmitError::MailProvider(_) => 400,
        }
    }

    /// Provider answers map to 400s; anything else is guessed at from
    /// the error text and answered with 500.
    pub fn from_mail(err: MailError) -> Self {
        if err.is_auth() {
            return SubmitError::MailAuth(err.to_string());
        }
        match err {
            MailError::Provider { message, .. } => SubmitError::MailProvider(message),
            MailError::Transport(message) => {
                let lower = message.to_lowercase();
                let summary = if lower.contains("timed out") || lower.contains("timeout") {
                    "Email service timed out. Please try again."
                } else if lower.contains("dns")
                    || lower.contains("connect")
                    || lower.contains("network")
                    || lower.contains("fetch")
                {
                    "Could not reach the email service. Please try again later."
                } else {
                    "Unexpected error while sending the report."
                };
                SubmitError::Unexpected(format!("{} ({})", summary, truncate_text(&message, 200)))
            }
        }
    }
}

impl From<ConfigError> for SubmitError {
    fn from(err: ConfigError) -> Self {
        SubmitError::Configuration(err.to_string())
    }
}

/// Renders cards into emails
#[derive(Debug, Clone)]
pub struct NotificationComposer {
    sender: String,
}

impl NotificationComposer {
    pub fn new(sender: impl Into<String>) -> Self {
        Self { sender: sender.into() }
    }

    pub fn compose(&self, payload: &SubmissionPayload, recipient: &str, attachment: Option<Attachment>) -> OutboundEmail {
        OutboundEmail {
            from: self.sender.clone(),
            to: vec![recipient.to_string()],
            subject: subject(payload),
            html: render_html(payload, attachment.as_ref().map(|a| a.filename.as_str())),
            attachments: attachment.into_iter().collect(),
        }
    }
}

fn subject(payload: &SubmissionPayload) -> String {
    let kind = match payload.unsafe_kind.as_str() {
        "act" => "Unsafe Act",
        "condition" => "Unsafe Condition",
        _ => "Hazard Observation",
    };
    let mut subject = format!("HOC Card: {} reported by {}", kind, single_line(&payload.observer_name));
    let location = single_line(&payload.location);
    if !location.is_empty() {
        subject.push_str(" at ");
        subject.push_str(&location);
    }
    truncate_text(&subject, SUBJECT_MAX_BYTES)
}

fn escape(value: &str) -> String {
    html_escape::encode_safe(value).replace('\n', "<br>")
}

fn display_or_dash(value: &str) -> String {
    if value.trim().is_empty() {
        "&mdash;".to_string()
    } else {
        escape(value.trim())
    }
}

fn render_tags(tags: &[String], elaboration: &str) -> String {
    if tags.is_empty() {
        return "&mdash;".to_string();
    }
    let items: String = tags
        .iter()
        .map(|tag| {
            if tag == TAG_OTHERS && !elaboration.trim().is_empty() {
                format!("<li>{}: {}</li>", escape(tag), escape(elaboration.trim()))
            } else {
                format!("<li>{}</li>", escape(tag))
            }
        })
        .collect();
    format!("<ul style=\"margin:0;padding-left:18px\">{}</ul>", items)
}

fn render_html(payload: &SubmissionPayload, attachment_name: Option<&str>) -> String {
    let stop_work = match payload.stop_work_enforced.as_str() {
        "yes" => "Yes",
        "no" => "No",
        "n/a" => "N/A",
        other => other,
    };
    let unsafe_kind = match payload.unsafe_kind.as_str() {
        "act" => "Unsafe Act",
        "condition" => "Unsafe Condition",
        other => other,
    };
    let evidence = match (payload.evidence_url(), attachment_name) {
        (Some(_), Some(name)) => format!("Attached as {}", escape(name)),
        (Some(url), None) => format!("Not attached (could not be retrieved): {}", escape(url)),
        (None, _) => "&mdash;".to_string(),
    };

    let rows = [
        ("Unsafe Act or Condition", display_or_dash(unsafe_kind)),
        ("Location", display_or_dash(&payload.location)),
        ("Observer Name", display_or_dash(&payload.observer_name)),
        ("Company", display_or_dash(&payload.company)),
        ("Position", display_or_dash(&payload.position)),
        ("Date", display_or_dash(&payload.date)),
        ("Time", display_or_dash(&payload.time)),
        ("Incident Details", display_or_dash(&payload.incident_details)),
        ("Corrective Actions", display_or_dash(&payload.corrective_actions)),
        (
            "Life-Saving Rules Violated",
            render_tags(&payload.life_saving_rules, &payload.other_life_saving_rules),
        ),
        (
            "Causal Factors",
            render_tags(&payload.causal_factors, &payload.other_causal_factors),
        ),
        ("Stop Work Authority Enforced", display_or_dash(stop_work)),
        ("Stop Work Actions", display_or_dash(&payload.stop_work_actions)),
        ("Evidence", evidence),
    ];

    let body: String = rows
        .iter()
        .map(|(label, value)| {
            format!(
                "<tr><th style=\"text-align:left;vertical-align:top;padding:6px 12px;background:#f4f4f4\">{}</th>\
                 <td style=\"padding:6px 12px\">{}</td></tr>",
                label, value
            )
        })
        .collect();

    format!(
        "<!DOCTYPE html><html><body style=\"font-family:Arial,sans-serif;color:#222\">\
         <h2 style=\"margin-bottom:4px\">Hazard Observation Card</h2>\
         <p style=\"margin-top:0;color:#666\">A new HOC card has been submitted.</p>\
         <table style=\"border-collapse:collapse;border:1px solid #ddd\">{}</table>\
         </body></html>",
        body
    )
}

/// Attachment file name for an evidence image
fn attachment_filename(url: &str, content_type: Option<&str>) -> String {
    let from_type = content_type.and_then(|ct| match ct.split(';').next().unwrap_or("").trim() {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/svg+xml" => Some("svg"),
        "image/webp" => Some("webp"),
        _ => None,
    });
    let ext = from_type.map(str::to_string).unwrap_or_else(|| {
        Url::parse(url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut s| s.next_back().map(str::to_string))
            })
            .and_then(|file| file.rsplit_once('.').map(|(_, e)| e.to_lowercase()))
            .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| "bin".to_string())
    });
    format!("hoc-evidence-{}.{}", uuid::Uuid::new_v4(), ext)
}

/// Sends cards and cleans up after them
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    blobs: Arc<dyn BlobStore>,
    composer: NotificationComposer,
    evidence_hosts: Vec<String>,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, blobs: Arc<dyn BlobStore>, composer: NotificationComposer) -> Self {
        Self {
            mailer,
            blobs,
            composer,
            evidence_hosts: Vec::new(),
        }
    }

    /// Only fetch or delete evidence on these hosts (and their subdomains)
    pub fn with_evidence_hosts(mut self, hosts: Vec<String>) -> Self {
        self.evidence_hosts = hosts;
        self
    }

    /// Validate, email, and clean up one card. Returns the provider's id.
    pub async fn deliver(&self, settings: &MailSettings, payload: &SubmissionPayload) -> Result<String, SubmitError> {
        if let Some(message) = payload.missing_required() {
            return Err(SubmitError::MissingField(message));
        }

        let evidence_url = payload.evidence_url().filter(|url| self.is_trusted(url));
        if payload.evidence_url().is_some() && evidence_url.is_none() {
            warn!("Ignoring evidence URL on an untrusted host");
        }

        let attachment = match evidence_url {
            Some(url) => BestEffort::from_result(self.fetch_attachment(url).await).log("Evidence attachment fetch"),
            None => None,
        };

        let email = self.composer.compose(payload, &settings.recipient, attachment);
        let id = match self.mailer.send(&settings.api_key, &email).await {
            Ok(id) => id,
            Err(e) => {
                error!("Email send failed: {}", e);
                return Err(SubmitError::from_mail(e));
            }
        };
        info!("HOC card from '{}' emailed (id {})", single_line(&payload.observer_name), id);

        if let Some(url) = evidence_url {
            BestEffort::from_result(self.blobs.delete(url).await).log("Evidence blob cleanup");
        }

        Ok(id)
    }

    async fn fetch_attachment(&self, url: &str) -> Result<Attachment, BlobError> {
        let blob = self.blobs.fetch(url).await?;
        Ok(Attachment {
            filename: attachment_filename(url, blob.content_type.as_deref()),
            content: STANDARD.encode(&blob.data),
        })
    }

    fn is_trusted(&self, url: &str) -> bool {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        host_allowed(&self.evidence_hosts, &host)
    }
}
