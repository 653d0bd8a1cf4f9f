//! Turns a verified SES event into per-recipient feedback records.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ClassifyError;
use crate::feedback::event::{
    Bounce, Click, Complaint, Delivery, DeliveryDelay, Mail, Open, Reject, RenderingFailure,
};
use crate::feedback::time::{clean_time, FeedbackTime};
use crate::feedback::types::{
    BounceRecord, ClickRecord, ComplaintRecord, DeliveryDelayRecord, DeliveryRecord,
    FeedbackEnvelope, FeedbackKind, FeedbackRecord, OpenRecord, RejectRecord,
    RenderingFailureRecord, SendRecord,
};
use crate::sns::notification::SnsNotification;

/// Records built from one inner message, in fan-out order.
#[derive(Debug, Clone)]
pub struct Classification {
    pub kind: FeedbackKind,
    pub records: Vec<FeedbackRecord>,
}

/// Envelope fields shared by every record of one message.
struct EnvelopeBase {
    topic_id: String,
    provider_message_id: String,
    mail_timestamp: FeedbackTime,
    mail_id: String,
    mail_from: String,
}

impl EnvelopeBase {
    fn for_address(&self, address: &str) -> FeedbackEnvelope {
        FeedbackEnvelope {
            topic_id: self.topic_id.clone(),
            provider_message_id: self.provider_message_id.clone(),
            mail_timestamp: self.mail_timestamp,
            mail_id: self.mail_id.clone(),
            mail_from: self.mail_from.clone(),
            address: address.to_string(),
            feedback_id: None,
            feedback_timestamp: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    use_tz: bool,
}

impl Classifier {
    pub fn new(use_tz: bool) -> Self {
        Self { use_tz }
    }

    /// Decode the `Message` string of a Notification.
    pub fn parse_message(raw: &str) -> Result<Value, ClassifyError> {
        serde_json::from_str(raw).map_err(ClassifyError::InvalidJson)
    }

    pub fn classify(
        &self,
        message: &Value,
        notification: &SnsNotification,
    ) -> Result<Classification, ClassifyError> {
        let object = message.as_object().ok_or(ClassifyError::MissingVitalFields)?;

        let mail_value = object
            .get("mail")
            .filter(|v| v.is_object())
            .ok_or(ClassifyError::MissingVitalFields)?;
        let event_type = object
            .get("eventType")
            .and_then(Value::as_str)
            .or_else(|| object.get("notificationType").and_then(Value::as_str))
            .ok_or(ClassifyError::MissingVitalFields)?;

        let kind = FeedbackKind::from_event_type(event_type)
            .ok_or_else(|| ClassifyError::UnknownType(event_type.to_string()))?;

        let mail: Mail = deserialize_section(kind, mail_value)?;
        let base = EnvelopeBase {
            topic_id: notification.topic_arn().to_string(),
            provider_message_id: notification.message_id().to_string(),
            mail_timestamp: self.time(&mail.timestamp)?,
            mail_id: mail.message_id.clone(),
            mail_from: mail.source.clone(),
        };

        let records = match kind {
            FeedbackKind::Bounce => self.bounces(section(kind, object, "bounce")?, &base)?,
            FeedbackKind::Complaint => {
                self.complaints(section(kind, object, "complaint")?, &base)?
            }
            FeedbackKind::Delivery => self.deliveries(section(kind, object, "delivery")?, &base)?,
            FeedbackKind::Send => sends(&mail, &base),
            FeedbackKind::Reject => rejects(section(kind, object, "reject")?, &mail, &base),
            FeedbackKind::Open => self.opens(section(kind, object, "open")?, &mail, &base)?,
            FeedbackKind::Click => self.clicks(section(kind, object, "click")?, &mail, &base)?,
            FeedbackKind::RenderingFailure => {
                rendering_failures(section(kind, object, "failure")?, &mail, &base)
            }
            FeedbackKind::DeliveryDelay => {
                self.delivery_delays(section(kind, object, "deliveryDelay")?, &base)?
            }
        };

        debug!(
            event_type = kind.label(),
            mail_id = %base.mail_id,
            records = records.len(),
            "ses_event_classified"
        );

        Ok(Classification { kind, records })
    }

    fn time(&self, raw: &str) -> Result<FeedbackTime, ClassifyError> {
        clean_time(raw, self.use_tz).map_err(|source| ClassifyError::InvalidTimestamp {
            value: raw.to_string(),
            source,
        })
    }

    fn optional_time(&self, raw: Option<&str>) -> Result<Option<FeedbackTime>, ClassifyError> {
        raw.map(|t| self.time(t)).transpose()
    }

    fn bounces(
        &self,
        bounce: Bounce,
        base: &EnvelopeBase,
    ) -> Result<Vec<FeedbackRecord>, ClassifyError> {
        let feedback_timestamp = self.time(&bounce.timestamp)?;
        let hard = bounce.bounce_type == "Permanent";

        Ok(bounce
            .bounced_recipients
            .iter()
            .map(|recipient| {
                let mut envelope = base.for_address(&recipient.email_address);
                envelope.feedback_id = Some(bounce.feedback_id.clone());
                envelope.feedback_timestamp = Some(feedback_timestamp);
                FeedbackRecord::Bounce(BounceRecord {
                    envelope,
                    hard,
                    bounce_type: bounce.bounce_type.clone(),
                    bounce_subtype: bounce.bounce_sub_type.clone(),
                    reporting_mta: bounce.reporting_mta.clone(),
                    action: recipient.action.clone(),
                    status: recipient.status.clone(),
                    diagnostic_code: recipient.diagnostic_code.clone(),
                })
            })
            .collect())
    }

    fn complaints(
        &self,
        complaint: Complaint,
        base: &EnvelopeBase,
    ) -> Result<Vec<FeedbackRecord>, ClassifyError> {
        let feedback_timestamp = self.time(&complaint.timestamp)?;
        let arrival_date = self.optional_time(complaint.arrival_date.as_deref())?;

        Ok(complaint
            .complained_recipients
            .iter()
            .map(|recipient| {
                let mut envelope = base.for_address(&recipient.email_address);
                envelope.feedback_id = Some(complaint.feedback_id.clone());
                envelope.feedback_timestamp = Some(feedback_timestamp);
                FeedbackRecord::Complaint(ComplaintRecord {
                    envelope,
                    useragent: complaint.user_agent.clone(),
                    feedback_type: complaint.complaint_feedback_type.clone(),
                    arrival_date,
                })
            })
            .collect())
    }

    fn deliveries(
        &self,
        delivery: Delivery,
        base: &EnvelopeBase,
    ) -> Result<Vec<FeedbackRecord>, ClassifyError> {
        let delivered_time = self.optional_time(delivery.timestamp.as_deref())?;

        Ok(delivery
            .recipients
            .iter()
            .map(|address| {
                FeedbackRecord::Delivery(DeliveryRecord {
                    envelope: base.for_address(address),
                    delivered_time,
                    processing_time_ms: delivery.processing_time_millis,
                    smtp_response: delivery.smtp_response.clone(),
                })
            })
            .collect())
    }

    fn opens(
        &self,
        open: Open,
        mail: &Mail,
        base: &EnvelopeBase,
    ) -> Result<Vec<FeedbackRecord>, ClassifyError> {
        let opened_time = self.optional_time(open.timestamp.as_deref())?;

        Ok(mail
            .destination
            .iter()
            .map(|address| {
                FeedbackRecord::Open(OpenRecord {
                    envelope: base.for_address(address),
                    opened_time,
                    ip_address: open.ip_address.clone(),
                    useragent: open.user_agent.clone(),
                })
            })
            .collect())
    }

    fn clicks(
        &self,
        click: Click,
        mail: &Mail,
        base: &EnvelopeBase,
    ) -> Result<Vec<FeedbackRecord>, ClassifyError> {
        let clicked_time = self.optional_time(click.timestamp.as_deref())?;
        let link_tags = click.link_tags.unwrap_or_default();

        Ok(mail
            .destination
            .iter()
            .map(|address| {
                FeedbackRecord::Click(ClickRecord {
                    envelope: base.for_address(address),
                    clicked_time,
                    ip_address: click.ip_address.clone(),
                    useragent: click.user_agent.clone(),
                    link: click.link.clone(),
                    link_tags: link_tags.clone(),
                })
            })
            .collect())
    }

    fn delivery_delays(
        &self,
        delay: DeliveryDelay,
        base: &EnvelopeBase,
    ) -> Result<Vec<FeedbackRecord>, ClassifyError> {
        let delayed_time = self.optional_time(delay.timestamp.as_deref())?;
        let expiration_time = self.optional_time(delay.expiration_time.as_deref())?;

        Ok(delay
            .delayed_recipients
            .iter()
            .map(|recipient| {
                FeedbackRecord::DeliveryDelay(DeliveryDelayRecord {
                    envelope: base.for_address(&recipient.email_address),
                    delayed_time,
                    delay_type: delay.delay_type.clone(),
                    expiration_time,
                    reporting_mta: delay.reporting_mta.clone(),
                    status: recipient.status.clone(),
                    diagnostic_code: recipient.diagnostic_code.clone(),
                })
            })
            .collect())
    }
}

fn sends(mail: &Mail, base: &EnvelopeBase) -> Vec<FeedbackRecord> {
    mail.destination
        .iter()
        .map(|address| {
            FeedbackRecord::Send(SendRecord {
                envelope: base.for_address(address),
            })
        })
        .collect()
}

fn rejects(reject: Reject, mail: &Mail, base: &EnvelopeBase) -> Vec<FeedbackRecord> {
    mail.destination
        .iter()
        .map(|address| {
            FeedbackRecord::Reject(RejectRecord {
                envelope: base.for_address(address),
                reason: reject.reason.clone(),
            })
        })
        .collect()
}

fn rendering_failures(
    failure: RenderingFailure,
    mail: &Mail,
    base: &EnvelopeBase,
) -> Vec<FeedbackRecord> {
    mail.destination
        .iter()
        .map(|address| {
            FeedbackRecord::RenderingFailure(RenderingFailureRecord {
                envelope: base.for_address(address),
                template_name: failure.template_name.clone(),
                error_message: failure.error_message.clone(),
            })
        })
        .collect()
}

fn section<'a, T: Deserialize<'a>>(
    kind: FeedbackKind,
    object: &'a Map<String, Value>,
    key: &str,
) -> Result<T, ClassifyError> {
    let value = object.get(key).ok_or_else(|| ClassifyError::Malformed {
        kind: kind.label(),
        message: format!("missing `{key}` object"),
    })?;
    deserialize_section(kind, value)
}

fn deserialize_section<'a, T: Deserialize<'a>>(
    kind: FeedbackKind,
    value: &'a Value,
) -> Result<T, ClassifyError> {
    T::deserialize(value).map_err(|e| ClassifyError::Malformed {
        kind: kind.label(),
        message: e.to_string(),
    })
}
