//! Bouncy - SNS endpoint for Amazon SES feedback.
//!
//! The library holds everything the `bouncy-endpoint` binary serves:
//!
//! ```text
//! SNS POST → NotificationGate → SignatureVerifier → Classifier → Dispatcher → FeedbackStore
//!                                                                          ↘ observers
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod feedback;
pub mod fetch;
pub mod processor;
pub mod queue;
pub mod sns;
pub mod web;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{Dispatcher, FeedbackStore, LogStore, MemoryStore, NotificationObserver};
pub use error::{CertificateError, ClassifyError, FetchError, ProcessError, StoreError};
pub use feedback::{FeedbackKind, FeedbackRecord};
pub use processor::{Outcome, Processor};
pub use queue::{Publisher, FEEDBACK_QUEUE};
pub use web::AppState;
