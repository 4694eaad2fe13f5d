//! Mail Provider
//!
//! Outbound transactional email over the provider's JSON API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::utils::{http_client, truncate_text};

#[derive(Debug, Error)]
pub enum MailError {
    /// The provider answered with an error document
    #[error("{name}: {message} (HTTP {status})")]
    Provider { status: u16, name: String, message: String },
    /// The request never got a usable answer
    #[error("{0}")]
    Transport(String),
}

impl MailError {
    /// Rejected credentials, as opposed to a rejected message
    pub fn is_auth(&self) -> bool {
        match self {
            MailError::Provider { status, name, message } => {
                let name = name.to_lowercase();
                let message = message.to_lowercase();
                matches!(status, 401 | 403)
                    || name.contains("api_key")
                    || name.contains("unauthorized")
                    || message.contains("api key")
            }
            MailError::Transport(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub filename: String,
    /// Base64 of the file bytes
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one email, returning the provider's message id
    async fn send(&self, api_key: &str, email: &OutboundEmail) -> Result<String, MailError>;
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ProviderError {
    name: String,
    message: String,
}

pub struct HttpMailer {
    client: Client,
    api_url: String,
}

impl HttpMailer {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, api_key: &str, email: &OutboundEmail) -> Result<String, MailError> {
        debug!("Sending '{}' to {:?} ({} attachments)", email.subject, email.to, email.attachments.len());

        let res = self
            .client
            .post(format!("{}/emails", self.api_url.trim_end_matches('/')))
            .bearer_auth(api_key)
            .json(email)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = res.status();
        let body = res.text().await.map_err(|e| MailError::Transport(e.to_string()))?;

        if !status.is_success() {
            let err: ProviderError = serde_json::from_str(&body).unwrap_or_default();
            return Err(MailError::Provider {
                status: status.as_u16(),
                name: if err.name.is_empty() { "provider_error".to_string() } else { err.name },
                message: if err.message.is_empty() { truncate_text(&body, 300) } else { err.message },
            });
        }

        let sent: SendResponse = serde_json::from_str(&body)
            .map_err(|e| MailError::Transport(format!("unreadable provider response: {}", e)))?;
        Ok(sent.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(status: u16, name: &str, message: &str) -> MailError {
        MailError::Provider {
            status,
            name: name.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_auth_detection() {
        assert!(provider(401, "missing_api_key", "Missing API key").is_auth());
        assert!(provider(400, "validation_error", "API key is invalid").is_auth());
        assert!(!provider(422, "validation_error", "Invalid `to` field").is_auth());
        assert!(!MailError::Transport("connection refused".to_string()).is_auth());
    }

    #[test]
    fn test_email_wire_shape() {
        let email = OutboundEmail {
            from: "HOC <hoc@example.com>".to_string(),
            to: vec!["safety@example.com".to_string()],
            subject: "s".to_string(),
            html: "<p>x</p>".to_string(),
            attachments: vec![],
        };
        let value = serde_json::to_value(&email).unwrap();
        assert!(value.get("attachments").is_none());
        assert_eq!(value["to"][0], "safety@example.com");
    }
}
