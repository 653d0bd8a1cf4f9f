//! Error types shared across the endpoint.
//!
//! Only failures that are the receiver's fault surface as errors: a broken
//! signing certificate or a feedback sink that refuses a record. Everything
//! the sender got wrong is answered with a fixed response instead.

use thiserror::Error;

/// Outbound HTTP failure before any response was received.
#[derive(Debug, Error)]
#[error("request to {url} failed: {message}")]
pub struct FetchError {
    pub url: String,
    pub message: String,
}

/// Failure to obtain a usable signing certificate.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("certificate fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("certificate fetch from {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("certificate file from {url} is not valid PEM: {message}")]
    InvalidPem { url: String, message: String },

    #[error("invalid certificate file from {url}: expected 1 certificate, found {count}")]
    CertificateCount { url: String, count: usize },

    #[error("certificate could not be decoded: {0}")]
    Malformed(String),

    #[error("certificate does not carry an RSA public key: {0}")]
    UnsupportedKey(String),
}

/// Failure to persist a feedback record.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize feedback record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("feedback sink unavailable: {0}")]
    Unavailable(String),
}

/// Reasons an SES event cannot be turned into records.
///
/// None of these are fatal: SNS gets a 200 so it stops redelivering.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("message is not valid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("message is missing vital fields")]
    MissingVitalFields,

    #[error("unknown notification type {0:?}")]
    UnknownType(String),

    #[error("{kind} event is malformed: {message}")]
    Malformed { kind: &'static str, message: String },

    #[error("invalid timestamp {value:?}: {source}")]
    InvalidTimestamp {
        value: String,
        source: chrono::ParseError,
    },
}

impl ClassifyError {
    /// Fixed response body acknowledging the message.
    pub fn acknowledgment(&self) -> &'static str {
        match self {
            ClassifyError::InvalidJson(_) => "Message is not valid JSON",
            ClassifyError::UnknownType(_) => "Unknown Notification Type",
            ClassifyError::MissingVitalFields
            | ClassifyError::Malformed { .. }
            | ClassifyError::InvalidTimestamp { .. } => "Missing Vital Fields",
        }
    }
}

/// Hard failure of a request, rendered as HTTP 500.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
