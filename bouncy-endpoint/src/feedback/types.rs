//! Normalized feedback records, one per affected recipient.
//!
//! Records are built once from a verified SNS message and never changed
//! afterwards. They serialize as JSON objects tagged with `kind`.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::feedback::time::FeedbackTime;

/// The nine SES event types the endpoint records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FeedbackKind {
    Bounce,
    Complaint,
    Delivery,
    Send,
    Reject,
    Open,
    Click,
    RenderingFailure,
    DeliveryDelay,
}

impl FeedbackKind {
    /// Match an SES `eventType` / `notificationType` value, case-sensitively.
    pub fn from_event_type(raw: &str) -> Option<Self> {
        match raw {
            "Bounce" => Some(FeedbackKind::Bounce),
            "Complaint" => Some(FeedbackKind::Complaint),
            "Delivery" => Some(FeedbackKind::Delivery),
            "Send" => Some(FeedbackKind::Send),
            "Reject" => Some(FeedbackKind::Reject),
            "Open" => Some(FeedbackKind::Open),
            "Click" => Some(FeedbackKind::Click),
            "Rendering Failure" | "RenderingFailure" => Some(FeedbackKind::RenderingFailure),
            "DeliveryDelay" => Some(FeedbackKind::DeliveryDelay),
            _ => None,
        }
    }

    /// Human-readable name used in logs and acknowledgments.
    pub fn label(&self) -> &'static str {
        match self {
            FeedbackKind::Bounce => "Bounce",
            FeedbackKind::Complaint => "Complaint",
            FeedbackKind::Delivery => "Delivery",
            FeedbackKind::Send => "Send",
            FeedbackKind::Reject => "Reject",
            FeedbackKind::Open => "Open",
            FeedbackKind::Click => "Click",
            FeedbackKind::RenderingFailure => "Rendering Failure",
            FeedbackKind::DeliveryDelay => "Delivery Delay",
        }
    }

    /// Body returned to SNS once every record of a message is dispatched.
    pub fn acknowledgment(&self) -> &'static str {
        match self {
            FeedbackKind::Bounce => "Bounce Processed",
            FeedbackKind::Complaint => "Complaint Processed",
            FeedbackKind::Delivery => "Delivery Processed",
            FeedbackKind::Send => "Send Processed",
            FeedbackKind::Reject => "Reject Processed",
            FeedbackKind::Open => "Open Processed",
            FeedbackKind::Click => "Click Processed",
            FeedbackKind::RenderingFailure => "Rendering Failure Processed",
            FeedbackKind::DeliveryDelay => "Delivery Delay Processed",
        }
    }
}

impl fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fields every record shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackEnvelope {
    /// SNS TopicArn
    pub topic_id: String,
    /// SNS MessageId of the outer envelope
    pub provider_message_id: String,
    pub mail_timestamp: FeedbackTime,
    /// SES message id of the original mail
    pub mail_id: String,
    pub mail_from: String,
    /// The one recipient this record is about
    pub address: String,
    /// Only bounces and complaints carry feedback ids
    pub feedback_id: Option<String>,
    pub feedback_timestamp: Option<FeedbackTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BounceRecord {
    #[serde(flatten)]
    pub envelope: FeedbackEnvelope,
    /// Permanent bounce
    pub hard: bool,
    pub bounce_type: String,
    pub bounce_subtype: String,
    pub reporting_mta: Option<String>,
    pub action: Option<String>,
    pub status: Option<String>,
    pub diagnostic_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplaintRecord {
    #[serde(flatten)]
    pub envelope: FeedbackEnvelope,
    pub useragent: Option<String>,
    pub feedback_type: Option<String>,
    pub arrival_date: Option<FeedbackTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryRecord {
    #[serde(flatten)]
    pub envelope: FeedbackEnvelope,
    pub delivered_time: Option<FeedbackTime>,
    pub processing_time_ms: i64,
    pub smtp_response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendRecord {
    #[serde(flatten)]
    pub envelope: FeedbackEnvelope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectRecord {
    #[serde(flatten)]
    pub envelope: FeedbackEnvelope,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenRecord {
    #[serde(flatten)]
    pub envelope: FeedbackEnvelope,
    pub opened_time: Option<FeedbackTime>,
    /// As reported by SES, not validated
    pub ip_address: Option<String>,
    pub useragent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClickRecord {
    #[serde(flatten)]
    pub envelope: FeedbackEnvelope,
    pub clicked_time: Option<FeedbackTime>,
    /// As reported by SES, not validated
    pub ip_address: Option<String>,
    pub useragent: Option<String>,
    pub link: Option<String>,
    pub link_tags: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderingFailureRecord {
    #[serde(flatten)]
    pub envelope: FeedbackEnvelope,
    pub template_name: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryDelayRecord {
    #[serde(flatten)]
    pub envelope: FeedbackEnvelope,
    pub delayed_time: Option<FeedbackTime>,
    pub delay_type: Option<String>,
    pub expiration_time: Option<FeedbackTime>,
    pub reporting_mta: Option<String>,
    pub status: Option<String>,
    pub diagnostic_code: Option<String>,
}

/// One normalized feedback record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum FeedbackRecord {
    Bounce(BounceRecord),
    Complaint(ComplaintRecord),
    Delivery(DeliveryRecord),
    Send(SendRecord),
    Reject(RejectRecord),
    Open(OpenRecord),
    Click(ClickRecord),
    RenderingFailure(RenderingFailureRecord),
    DeliveryDelay(DeliveryDelayRecord),
}

impl FeedbackRecord {
    pub fn kind(&self) -> FeedbackKind {
        match self {
            FeedbackRecord::Bounce(_) => FeedbackKind::Bounce,
            FeedbackRecord::Complaint(_) => FeedbackKind::Complaint,
            FeedbackRecord::Delivery(_) => FeedbackKind::Delivery,
            FeedbackRecord::Send(_) => FeedbackKind::Send,
            FeedbackRecord::Reject(_) => FeedbackKind::Reject,
            FeedbackRecord::Open(_) => FeedbackKind::Open,
            FeedbackRecord::Click(_) => FeedbackKind::Click,
            FeedbackRecord::RenderingFailure(_) => FeedbackKind::RenderingFailure,
            FeedbackRecord::DeliveryDelay(_) => FeedbackKind::DeliveryDelay,
        }
    }

    pub fn envelope(&self) -> &FeedbackEnvelope {
        match self {
            FeedbackRecord::Bounce(r) => &r.envelope,
            FeedbackRecord::Complaint(r) => &r.envelope,
            FeedbackRecord::Delivery(r) => &r.envelope,
            FeedbackRecord::Send(r) => &r.envelope,
            FeedbackRecord::Reject(r) => &r.envelope,
            FeedbackRecord::Open(r) => &r.envelope,
            FeedbackRecord::Click(r) => &r.envelope,
            FeedbackRecord::RenderingFailure(r) => &r.envelope,
            FeedbackRecord::DeliveryDelay(r) => &r.envelope,
        }
    }

    pub fn address(&self) -> &str {
        &self.envelope().address
    }
}

impl fmt::Display for FeedbackRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let envelope = self.envelope();
        match self {
            FeedbackRecord::Bounce(r) => write!(
                f,
                "{} {} Bounce (message from {})",
                envelope.address, r.bounce_type, envelope.mail_from
            ),
            FeedbackRecord::Complaint(_) => write!(
                f,
                "{} Complaint (email sender: from {})",
                envelope.address, envelope.mail_from
            ),
            FeedbackRecord::Reject(r) => write!(
                f,
                "{} {} Reject (email sender: {})",
                envelope.address,
                r.reason.as_deref().unwrap_or("unknown"),
                envelope.mail_from
            ),
            FeedbackRecord::Click(r) => write!(
                f,
                "{} {} Click (email sender: {})",
                envelope.address,
                r.link.as_deref().unwrap_or("-"),
                envelope.mail_from
            ),
            FeedbackRecord::RenderingFailure(r) => write!(
                f,
                "{} {} rendering failure {}",
                envelope.address,
                r.template_name.as_deref().unwrap_or("-"),
                r.error_message.as_deref().unwrap_or("")
            ),
            FeedbackRecord::DeliveryDelay(r) => write!(
                f,
                "{} delivery delay {} {}",
                envelope.address,
                r.status.as_deref().unwrap_or("-"),
                r.diagnostic_code.as_deref().unwrap_or("")
            ),
            other => write!(
                f,
                "{} {} (email sender: {})",
                envelope.address,
                other.kind(),
                envelope.mail_from
            ),
        }
    }
}
