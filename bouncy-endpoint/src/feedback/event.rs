//! Wire shapes of the SES event JSON carried in an SNS `Message`.
//!
//! Only the sections needed to build records are modeled. Required fields
//! are plain values so a missing one fails deserialization; everything
//! SES treats as optional is an `Option`.

use std::collections::BTreeMap;

use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mail {
    pub timestamp: String,
    pub message_id: String,
    pub source: String,
    #[serde(default)]
    pub destination: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounce {
    pub bounce_type: String,
    pub bounce_sub_type: String,
    pub bounced_recipients: Vec<BouncedRecipient>,
    pub timestamp: String,
    pub feedback_id: String,
    #[serde(rename = "reportingMTA")]
    pub reporting_mta: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BouncedRecipient {
    pub email_address: String,
    pub action: Option<String>,
    pub status: Option<String>,
    pub diagnostic_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Complaint {
    pub complained_recipients: Vec<ComplainedRecipient>,
    pub timestamp: String,
    pub feedback_id: String,
    pub user_agent: Option<String>,
    pub complaint_feedback_type: Option<String>,
    pub arrival_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplainedRecipient {
    pub email_address: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub timestamp: Option<String>,
    #[serde(deserialize_with = "deserialize_millis")]
    pub processing_time_millis: i64,
    pub recipients: Vec<String>,
    pub smtp_response: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reject {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Open {
    pub timestamp: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Click {
    pub timestamp: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub link: Option<String>,
    pub link_tags: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderingFailure {
    pub template_name: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDelay {
    pub timestamp: Option<String>,
    pub delay_type: Option<String>,
    pub expiration_time: Option<String>,
    #[serde(rename = "reportingMTA")]
    pub reporting_mta: Option<String>,
    pub delayed_recipients: Vec<DelayedRecipient>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayedRecipient {
    pub email_address: String,
    pub status: Option<String>,
    pub diagnostic_code: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Millis {
    Number(i64),
    Float(f64),
    Text(String),
}

/// SES has sent `processingTimeMillis` as an integer, as a float with no
/// fractional part and as a string.
fn deserialize_millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Millis::deserialize(deserializer)? {
        Millis::Number(n) => Ok(n),
        Millis::Float(f) => whole_millis(f).map_err(de::Error::custom),
        Millis::Text(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(n) => Ok(n),
                Err(_) => s
                    .parse::<f64>()
                    .map_err(|_| format!("invalid processingTimeMillis: {s:?}"))
                    .and_then(whole_millis)
                    .map_err(de::Error::custom),
            }
        }
    }
}

fn whole_millis(f: f64) -> Result<i64, String> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() <= i64::MAX as f64 {
        Ok(f as i64)
    } else {
        Err(format!("processingTimeMillis must be a whole number, got {f}"))
    }
}
