//! RabbitMQ sink for feedback records.
//!
//! ```text
//! Dispatcher → Publisher → ses_feedback queue → downstream consumers
//! ```

pub mod publisher;
pub mod types;

pub use publisher::Publisher;
pub use types::{feedback_message_id, FEEDBACK_QUEUE};
