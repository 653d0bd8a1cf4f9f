//! Structural checks applied to every inbound request before any
//! cryptography happens.
//!
//! The checks run in a fixed order and stop at the first failure, so a
//! request without the topic header is reported as such even when its body
//! is garbage.

use std::collections::HashSet;

use axum::http::{Method, StatusCode};
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use crate::sns::notification::{NotificationType, SnsNotification, VITAL_NOTIFICATION_FIELDS};

/// Header SNS uses to announce the topic a message was published to.
pub const TOPIC_ARN_HEADER: &str = "x-amz-sns-topic-arn";

/// Why the gate turned a request away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    /// Anything but POST; the endpoint pretends not to exist
    NotFound,
    MissingTopicHeader,
    BadTopic,
    InvalidJson,
    MissingKeys,
    UnknownType,
    ImproperCertificateLocation,
}

impl GateRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            GateRejection::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn body(&self) -> &'static str {
        match self {
            GateRejection::NotFound => "",
            GateRejection::MissingTopicHeader => "No TopicArn Header",
            GateRejection::BadTopic => "Bad Topic",
            GateRejection::InvalidJson => "Not Valid JSON",
            GateRejection::MissingKeys => "Request Missing Necessary Keys",
            GateRejection::UnknownType => "Unknown Notification Type",
            GateRejection::ImproperCertificateLocation => "Improper Certificate Location",
        }
    }
}

/// True when the host of `url` matches `pattern` anywhere (search, not
/// full match). Unparseable URLs and URLs without a host never match.
pub fn host_matches(pattern: &Regex, url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| pattern.is_match(h)))
        .unwrap_or(false)
}

/// Transport-level validation of SNS requests.
#[derive(Debug, Clone)]
pub struct NotificationGate {
    topic_arns: Option<HashSet<String>>,
    cert_domain: Regex,
}

impl NotificationGate {
    pub fn new(
        topic_arns: Option<Vec<String>>,
        cert_domain_regex: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            topic_arns: topic_arns.map(|arns| arns.into_iter().collect()),
            cert_domain: Regex::new(cert_domain_regex)?,
        })
    }

    /// Run all checks, returning the decoded notification on success.
    pub fn check(
        &self,
        method: &Method,
        topic_header: Option<&str>,
        body: &[u8],
    ) -> Result<SnsNotification, GateRejection> {
        if *method != Method::POST {
            return Err(GateRejection::NotFound);
        }

        if let Some(allowed) = &self.topic_arns {
            let topic = match topic_header {
                Some(t) => t,
                None => {
                    warn!("sns_topic_header_missing");
                    return Err(GateRejection::MissingTopicHeader);
                }
            };
            if !allowed.contains(topic) {
                warn!(topic_arn = %topic, "sns_topic_not_allowed");
                return Err(GateRejection::BadTopic);
            }
        }

        let data: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    error = %e,
                    body_preview = %String::from_utf8_lossy(&body[..body.len().min(200)]),
                    "sns_notification_invalid_json"
                );
                return Err(GateRejection::InvalidJson);
            }
        };

        let fields = match data {
            Value::Object(map)
                if VITAL_NOTIFICATION_FIELDS
                    .iter()
                    .all(|key| map.contains_key(*key)) =>
            {
                map
            }
            _ => {
                warn!("sns_notification_missing_keys");
                return Err(GateRejection::MissingKeys);
            }
        };

        let raw_type = fields.get("Type").and_then(Value::as_str).unwrap_or_default();
        let kind = match NotificationType::parse(raw_type) {
            Some(k) => k,
            None => {
                info!(notification_type = %raw_type, "sns_notification_type_unknown");
                return Err(GateRejection::UnknownType);
            }
        };

        let cert_url = fields
            .get("SigningCertURL")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !host_matches(&self.cert_domain, cert_url) {
            warn!(signing_cert_url = %cert_url, "sns_certificate_location_improper");
            return Err(GateRejection::ImproperCertificateLocation);
        }

        Ok(SnsNotification::new(kind, fields))
    }
}
