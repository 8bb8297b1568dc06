//! ---
//! iotsim_section: "02-messaging-data-model"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Telemetry message types and publish channels."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Telemetry channel used by device runners.
//!
//! Publishing is fire-and-report: errors surface to the caller unchanged and
//! nothing here retries.

pub mod http;
pub mod transport;
pub mod types;

/// Shared result type for publish operations.
pub type Result<T> = std::result::Result<T, PublishError>;

/// Failures raised while publishing telemetry.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The channel refused the message.
    #[error("publish to '{topic}' rejected: {reason}")]
    Rejected {
        /// Topic the message was addressed to.
        topic: String,
        /// Channel-specific explanation.
        reason: String,
    },
    /// HTTP bridge failures (connection, non-success status).
    #[error("http publish failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The configured endpoint cannot address topics.
    #[error("invalid publish endpoint: {0}")]
    InvalidEndpoint(String),
    /// Wrapper for IO errors from stream-backed channels.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for payload serialization problems.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub use http::{HttpPublisher, DEFAULT_REQUEST_TIMEOUT};
pub use transport::{InMemoryPublisher, JsonLinesPublisher, PublishedMessage, Publisher};
pub use types::{QoS, TelemetryMessage};
