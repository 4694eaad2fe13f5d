//! Utils Module
pub mod best_effort;
pub mod http;
pub mod truncate;

pub use best_effort::BestEffort;
pub use http::http_client;
pub use truncate::{single_line, truncate_text};
