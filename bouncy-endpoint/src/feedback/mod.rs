//! SES feedback: event payloads, normalized records and classification.

pub mod classify;
pub mod event;
pub mod time;
pub mod types;

pub use classify::{Classification, Classifier};
pub use time::{clean_time, FeedbackTime};
pub use types::{FeedbackEnvelope, FeedbackKind, FeedbackRecord};
