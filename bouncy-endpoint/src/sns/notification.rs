//! The outer SNS envelope as delivered to the endpoint.

use serde_json::{Map, Value};

/// Keys every SNS message must carry before it is worth verifying.
pub const VITAL_NOTIFICATION_FIELDS: &[&str] = &[
    "Type",
    "Message",
    "Timestamp",
    "Signature",
    "SignatureVersion",
    "TopicArn",
    "MessageId",
    "SigningCertURL",
];

/// SNS message types the endpoint understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    Notification,
    SubscriptionConfirmation,
    UnsubscribeConfirmation,
}

impl NotificationType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Notification" => Some(NotificationType::Notification),
            "SubscriptionConfirmation" => Some(NotificationType::SubscriptionConfirmation),
            "UnsubscribeConfirmation" => Some(NotificationType::UnsubscribeConfirmation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Notification => "Notification",
            NotificationType::SubscriptionConfirmation => "SubscriptionConfirmation",
            NotificationType::UnsubscribeConfirmation => "UnsubscribeConfirmation",
        }
    }
}

/// An SNS message that passed the structural gate.
///
/// The raw JSON object is kept intact: the signature covers the exact field
/// values, and observers receive the notification as delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct SnsNotification {
    kind: NotificationType,
    fields: Map<String, Value>,
}

impl SnsNotification {
    /// Callers guarantee the vital fields are present and `Type` matches `kind`.
    pub(crate) fn new(kind: NotificationType, fields: Map<String, Value>) -> Self {
        Self { kind, fields }
    }

    pub fn kind(&self) -> NotificationType {
        self.kind
    }

    /// String value of a top-level field, if present and a string.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn message(&self) -> Option<&str> {
        self.field("Message")
    }

    pub fn message_id(&self) -> &str {
        self.field("MessageId").unwrap_or_default()
    }

    pub fn topic_arn(&self) -> &str {
        self.field("TopicArn").unwrap_or_default()
    }

    pub fn signature(&self) -> &str {
        self.field("Signature").unwrap_or_default()
    }

    pub fn signature_version(&self) -> Option<&str> {
        self.field("SignatureVersion")
    }

    pub fn signing_cert_url(&self) -> &str {
        self.field("SigningCertURL").unwrap_or_default()
    }

    pub fn subscribe_url(&self) -> Option<&str> {
        self.field("SubscribeURL")
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// The notification as a JSON value, for observers.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}
