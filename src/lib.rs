//! HOC Card
//!
//! Hazard Observation Card reporting:
//! - A four-step form with per-step validation
//! - Direct-to-storage evidence upload with signed client tokens
//! - A submission backend that emails each card to a safety inbox

pub mod client;
pub mod config;
pub mod form;
pub mod notify;
pub mod payload;
pub mod server;
pub mod storage;
pub mod utils;

// Re-exports for convenience
pub use client::{HttpHocApi, SubmissionDispatcher};
pub use config::{ClientConfig, ServerConfig};
pub use form::{FormStore, IncidentRecord};
pub use payload::SubmissionPayload;
pub use server::{router, run_server, AppState};
