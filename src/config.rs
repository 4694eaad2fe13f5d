//! Configuration
//!
//! Settings come from the environment (after `.env` is loaded by the
//! binaries). The two mail secrets are optional at boot and checked per
//! request, so a misconfigured deployment still answers with a clear
//! configuration error instead of refusing to start.

use std::env;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BIND: &str = "0.0.0.0:3000";
const DEFAULT_SENDER: &str = "HOC Card <onboarding@resend.dev>";
const DEFAULT_MAIL_API: &str = "https://api.resend.com";
const DEFAULT_BLOB_API: &str = "https://blob.vercel-storage.com";
const DEFAULT_BACKEND: &str = "http://127.0.0.1:3000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
}

/// Secrets needed to send one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSettings {
    pub api_key: String,
    pub recipient: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub mail_api_key: Option<String>,
    pub recipient: Option<String>,
    pub sender: String,
    pub mail_api_url: String,
    pub blob_token: Option<String>,
    pub blob_api_url: String,
    /// Hosts evidence URLs may point at; empty accepts any host
    pub evidence_hosts: Vec<String>,
    pub upload_token_ttl: Duration,
    pub http_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            mail_api_key: None,
            recipient: None,
            sender: DEFAULT_SENDER.to_string(),
            mail_api_url: DEFAULT_MAIL_API.to_string(),
            blob_token: None,
            blob_api_url: DEFAULT_BLOB_API.to_string(),
            evidence_hosts: Vec::new(),
            upload_token_ttl: Duration::from_secs(3600),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Self {
            bind_addr: get("HOC_BIND_ADDR").unwrap_or(defaults.bind_addr),
            mail_api_key: get("HOC_MAIL_API_KEY"),
            recipient: get("HOC_RECIPIENT_EMAIL"),
            sender: get("HOC_SENDER_EMAIL").unwrap_or(defaults.sender),
            mail_api_url: get("HOC_MAIL_API_URL").unwrap_or(defaults.mail_api_url),
            blob_token: get("HOC_BLOB_READ_WRITE_TOKEN"),
            blob_api_url: get("HOC_BLOB_API_URL").unwrap_or(defaults.blob_api_url),
            evidence_hosts: get("HOC_EVIDENCE_HOSTS")
                .map(|v| {
                    v.split(',')
                        .map(|h| h.trim().to_lowercase())
                        .filter(|h| !h.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            upload_token_ttl: get("HOC_UPLOAD_TOKEN_TTL_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| Duration::from_secs(secs.clamp(60, 86_400)))
                .unwrap_or(defaults.upload_token_ttl),
            http_timeout: parse_timeout(get("HOC_HTTP_TIMEOUT_SECS")).unwrap_or(defaults.http_timeout),
        }
    }

    /// Both mail secrets, or the first one missing
    pub fn mail_settings(&self) -> Result<MailSettings, ConfigError> {
        let api_key = self.mail_api_key.clone().ok_or(ConfigError::Missing("HOC_MAIL_API_KEY"))?;
        let recipient = self.recipient.clone().ok_or(ConfigError::Missing("HOC_RECIPIENT_EMAIL"))?;
        Ok(MailSettings { api_key, recipient })
    }
}

/// Whether `host` is one of `allowed` or a subdomain of one; an empty
/// list allows every host
pub fn host_allowed(allowed: &[String], host: &str) -> bool {
    let host = host.to_lowercase();
    allowed.is_empty()
        || allowed
            .iter()
            .any(|a| host == *a || host.ends_with(&format!(".{a}")))
}

/// Settings for the terminal wizard
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend_url: String,
    pub storage_url: String,
    pub http_timeout: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let get = |key: &str| env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            backend_url: get("HOC_BACKEND_URL").unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            storage_url: get("HOC_STORAGE_URL").unwrap_or_else(|| DEFAULT_BLOB_API.to_string()),
            http_timeout: parse_timeout(get("HOC_HTTP_TIMEOUT_SECS")).unwrap_or(Duration::from_secs(30)),
        }
    }
}

fn parse_timeout(value: Option<String>) -> Option<Duration> {
    value
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| (1..=300).contains(secs))
        .map(Duration::from_secs)
}
