//! Wire conventions for the feedback queue.
//!
//! Each message body is one [`FeedbackRecord`] serialized as JSON, tagged
//! with `kind`.

use crate::feedback::FeedbackRecord;

/// Durable queue receiving one message per feedback record.
pub const FEEDBACK_QUEUE: &str = "ses_feedback";

/// AMQP message id for a record.
///
/// SNS message ids are shared by every record fanned out of one message, so
/// the recipient address is appended.
pub fn feedback_message_id(record: &FeedbackRecord) -> String {
    let envelope = record.envelope();
    format!("{}:{}", envelope.provider_message_id, envelope.address)
}
