//! Upload Tokens
//!
//! Short-lived client tokens that let the browser (or the terminal
//! wizard) put one image straight into object storage. Claims are
//! signed with HMAC-SHA256 keyed by the storage read-write token, so
//! only the storage service and this backend can mint or check them.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::form::MAX_EVIDENCE_BYTES;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_PREFIX: &str = "hoc_blob_client_";
const RANDOM_SUFFIX_LEN: usize = 21;

/// Content types a client token may upload
pub const ALLOWED_UPLOAD_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif", "image/svg+xml"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("pathname is empty or escapes the store")]
    InvalidPathname,
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("signing key is unusable")]
    InvalidKey,
}

/// Body of `POST /api/blob-upload`, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BlobUploadEvent {
    #[serde(rename = "blob.generate-client-token")]
    GenerateClientToken(TokenRequest),
    #[serde(rename = "blob.upload-completed")]
    UploadCompleted(UploadCompleted),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub pathname: String,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub client_payload: Option<String>,
    #[serde(default)]
    pub multipart: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCompleted {
    pub blob: UploadedBlob,
    #[serde(default)]
    pub token_payload: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedBlob {
    pub url: String,
    #[serde(default)]
    pub pathname: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Reply envelope of `POST /api/blob-upload`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BlobUploadReply {
    #[serde(rename = "blob.generate-client-token")]
    ClientToken {
        #[serde(rename = "clientToken")]
        client_token: String,
    },
    #[serde(rename = "blob.upload-completed")]
    UploadCompleted { response: String },
}

/// What a client token permits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientTokenClaims {
    pub pathname: String,
    pub allowed_content_types: Vec<String>,
    pub maximum_size_in_bytes: u64,
    pub add_random_suffix: bool,
    /// Milliseconds since the Unix epoch
    pub valid_until: i64,
    pub token_payload: String,
}

impl ClientTokenClaims {
    pub fn allows(&self, content_type: &str) -> bool {
        self.allowed_content_types.iter().any(|t| t == content_type)
    }
}

pub struct UploadSigner {
    secret: String,
    ttl: Duration,
}

impl UploadSigner {
    pub fn new(secret: impl Into<String>, ttl: std::time::Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::hours(1)),
        }
    }

    /// Mint a token for `pathname`, randomizing its file stem
    pub fn issue(&self, pathname: &str, now: DateTime<Utc>) -> Result<(String, ClientTokenClaims), TokenError> {
        let pathname = sanitize_pathname(pathname)?;
        let claims = ClientTokenClaims {
            pathname: with_random_suffix(&pathname),
            allowed_content_types: ALLOWED_UPLOAD_TYPES.iter().map(|t| t.to_string()).collect(),
            maximum_size_in_bytes: MAX_EVIDENCE_BYTES,
            add_random_suffix: true,
            valid_until: (now + self.ttl).timestamp_millis(),
            token_payload: "{}".to_string(),
        };
        let json = serde_json::to_vec(&claims).map_err(|_| TokenError::Malformed)?;
        let body = URL_SAFE_NO_PAD.encode(json);
        let signature = hex::encode(self.mac(&body)?.finalize().into_bytes());
        Ok((format!("{TOKEN_PREFIX}{body}.{signature}"), claims))
    }

    /// Check signature and expiry, returning the claims.
    ///
    /// This is the check the storage service applies to the bearer token
    /// of an upload PUT; any service holding the read-write token can run
    /// it the same way.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<ClientTokenClaims, TokenError> {
        let rest = token.strip_prefix(TOKEN_PREFIX).ok_or(TokenError::Malformed)?;
        let (body, signature) = rest.rsplit_once('.').ok_or(TokenError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| TokenError::Malformed)?;
        self.mac(body)?
            .verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;
        let json = URL_SAFE_NO_PAD.decode(body).map_err(|_| TokenError::Malformed)?;
        let claims: ClientTokenClaims = serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)?;
        if claims.valid_until < now.timestamp_millis() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    fn mac(&self, body: &str) -> Result<HmacSha256, TokenError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).map_err(|_| TokenError::InvalidKey)?;
        mac.update(body.as_bytes());
        Ok(mac)
    }
}

fn sanitize_pathname(pathname: &str) -> Result<String, TokenError> {
    let cleaned = pathname.trim().trim_start_matches('/');
    if cleaned.is_empty() || cleaned.split('/').any(|seg| seg == ".." || seg.is_empty()) {
        return Err(TokenError::InvalidPathname);
    }
    Ok(cleaned.to_string())
}

/// `site/leak.png` -> `site/leak-<21 random chars>.png`
fn with_random_suffix(pathname: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(char::from)
        .collect();
    let (dir, file) = match pathname.rsplit_once('/') {
        Some((dir, file)) => (format!("{dir}/"), file),
        None => (String::new(), pathname),
    };
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{dir}{stem}-{suffix}.{ext}"),
        _ => format!("{dir}{file}-{suffix}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> UploadSigner {
        UploadSigner::new("vercel_blob_rw_test_secret", std::time::Duration::from_secs(60))
    }

    #[test]
    fn test_signature_matches_rfc4231_case_2() {
        let jefe = UploadSigner::new("Jefe", std::time::Duration::from_secs(60));
        let mac = jefe.mac("what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(mac.finalize().into_bytes()),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_rejects_forged_signature() {
        let now = Utc::now();
        let (token, _) = signer().issue("spill.png", now).unwrap();
        let (body, signature) = token.rsplit_once('.').unwrap();

        let flipped = if signature.starts_with('0') { "1" } else { "0" };
        let forged = format!("{}.{}{}", body, flipped, &signature[1..]);
        assert_eq!(signer().verify(&forged, now), Err(TokenError::BadSignature));

        let truncated = format!("{}.{}", body, &signature[..32]);
        assert_eq!(signer().verify(&truncated, now), Err(TokenError::BadSignature));

        let not_hex = format!("{}.zz", body);
        assert_eq!(signer().verify(&not_hex, now), Err(TokenError::Malformed));
    }

    #[test]
    fn test_issue_then_verify() {
        let now = Utc::now();
        let (token, claims) = signer().issue("evidence/spill.png", now).unwrap();
        assert!(token.starts_with(TOKEN_PREFIX));
        assert!(claims.pathname.starts_with("evidence/spill-"));
        assert!(claims.pathname.ends_with(".png"));
        assert!(claims.allows("image/webp"));
        assert!(!claims.allows("application/pdf"));

        let verified = signer().verify(&token, now).unwrap();
        assert_eq!(verified, claims);
    }

    #[test]
    fn test_random_suffix_avoids_collisions() {
        let now = Utc::now();
        let (_, a) = signer().issue("spill.png", now).unwrap();
        let (_, b) = signer().issue("spill.png", now).unwrap();
        assert_ne!(a.pathname, b.pathname);
    }

    #[test]
    fn test_verify_rejects_tampering_and_expiry() {
        let now = Utc::now();
        let (token, _) = signer().issue("spill.png", now).unwrap();

        let other = UploadSigner::new("another_secret", std::time::Duration::from_secs(60));
        assert_eq!(other.verify(&token, now), Err(TokenError::BadSignature));

        let later = now + Duration::seconds(120);
        assert_eq!(signer().verify(&token, later), Err(TokenError::Expired));

        assert_eq!(signer().verify("garbage", now), Err(TokenError::Malformed));
    }

    #[test]
    fn test_pathname_must_stay_inside_store() {
        let now = Utc::now();
        assert_eq!(signer().issue("  ", now).unwrap_err(), TokenError::InvalidPathname);
        assert_eq!(signer().issue("../etc/passwd", now).unwrap_err(), TokenError::InvalidPathname);
    }

    #[test]
    fn test_event_wire_format() {
        let event: BlobUploadEvent = serde_json::from_value(serde_json::json!({
            "type": "blob.generate-client-token",
            "payload": { "pathname": "spill.png", "callbackUrl": "https://hoc.example/api/blob-upload" }
        }))
        .unwrap();
        match event {
            BlobUploadEvent::GenerateClientToken(req) => {
                assert_eq!(req.pathname, "spill.png");
                assert!(!req.multipart);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let reply = serde_json::to_value(BlobUploadReply::ClientToken {
            client_token: "t".to_string(),
        })
        .unwrap();
        assert_eq!(reply, serde_json::json!({ "type": "blob.generate-client-token", "clientToken": "t" }));
    }
}
