//! Shared HTTP client construction.

use reqwest::Client;
use std::time::Duration;
use tracing::warn;

/// Client with `timeout` applied to every request. Falls back to the
/// default client, with a warning, if the TLS backend cannot be set up.
pub fn http_client(timeout: Duration) -> Client {
    match Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!("Failed to build HTTP client with {:?} timeout, using defaults: {}", timeout, e);
            Client::default()
        }
    }
}
