//! Fixtures shared by unit tests: keys, signed SNS envelopes and a fake
//! HTTP fetcher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use sha1::Sha1;

use crate::error::FetchError;
use crate::feedback::types::{FeedbackEnvelope, FeedbackRecord, SendRecord};
use crate::feedback::clean_time;
use crate::fetch::{FetchResponse, Fetcher};
use crate::sns::notification::{NotificationType, SnsNotification};
use crate::sns::signature::canonical_string;

pub const SIGNING_CERT_PEM: &str = include_str!("../fixtures/signing-cert.pem");
pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing-key.pem");
pub const OTHER_CERT_PEM: &str = include_str!("../fixtures/other-cert.pem");
pub const OTHER_KEY_PEM: &str = include_str!("../fixtures/other-key.pem");

pub const TOPIC_ARN: &str = "arn:aws:sns:us-east-1:123456789012:ses-feedback";
pub const CERT_URL: &str =
    "https://sns.us-east-1.amazonaws.com/SimpleNotificationService-e372f8ca30337fdb084e8ac449342c77.pem";
pub const SUBSCRIBE_URL: &str = "https://sns.us-east-1.amazonaws.com/?Action=ConfirmSubscription&TopicArn=arn:aws:sns:us-east-1:123456789012:ses-feedback&Token=2336412f37fb687f5d51e6e241d164b0";

/// Fetcher that serves canned responses and counts calls.
///
/// Per-URL routes win over the default response.
pub struct MockFetcher {
    response: Option<FetchResponse>,
    routes: HashMap<String, FetchResponse>,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn ok(body: &[u8]) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: &[u8]) -> Self {
        Self {
            response: Some(FetchResponse {
                status,
                body: body.to_vec(),
            }),
            routes: HashMap::new(),
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            routes: HashMap::new(),
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn route(mut self, url: &str, status: u16, body: &[u8]) -> Self {
        self.routes.insert(
            url.to_string(),
            FetchResponse {
                status,
                body: body.to_vec(),
            },
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        if let Some(routed) = self.routes.get(url) {
            return Ok(routed.clone());
        }
        self.response.clone().ok_or_else(|| FetchError {
            url: url.to_string(),
            message: "connection refused".to_string(),
        })
    }
}

/// Sign a canonical string with SHA1withRSA, base64 encoded like SNS does.
pub fn sign_canonical(key_pem: &str, canonical: &str) -> String {
    let key = RsaPrivateKey::from_pkcs8_pem(key_pem).unwrap();
    let signing_key = SigningKey::<Sha1>::new(key);
    let signature = signing_key.sign(canonical.as_bytes());
    BASE64.encode(signature.to_bytes())
}

pub fn notification_from(raw: Value) -> SnsNotification {
    let kind = NotificationType::parse(raw["Type"].as_str().unwrap()).unwrap();
    SnsNotification::new(kind, raw.as_object().unwrap().clone())
}

/// Fill in `Signature` using the fixture signing key.
pub fn sign_notification(mut raw: Value) -> Value {
    let canonical = canonical_string(&notification_from(raw.clone())).unwrap();
    raw["Signature"] = json!(sign_canonical(SIGNING_KEY_PEM, &canonical));
    raw
}

/// A signed SNS Notification wrapping `message` (serialized when not a string).
pub fn signed_notification(message: &Value) -> Value {
    let message = match message {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    sign_notification(json!({
        "Type": "Notification",
        "MessageId": "f34c6922-c3a1-54a1-bd88-23f998b43978",
        "TopicArn": TOPIC_ARN,
        "Message": message,
        "Timestamp": "2012-06-19T01:23:30.558Z",
        "SignatureVersion": "1",
        "Signature": "",
        "SigningCertURL": CERT_URL,
        "UnsubscribeURL": "https://sns.us-east-1.amazonaws.com/?Action=Unsubscribe&SubscriptionArn=arn:aws:sns:us-east-1:123456789012:ses-feedback:1"
    }))
}

pub fn mail_object(destination: &[&str]) -> Value {
    json!({
        "timestamp": "2012-06-19T01:05:45.000Z",
        "source": "sender@example.com",
        "sourceArn": "arn:aws:ses:us-east-1:123456789012:identity/example.com",
        "sendingAccountId": "123456789012",
        "messageId": "00000138111222aa-33322211-cccc-cccc-cccc-ddddaaaa0680-000000",
        "destination": destination
    })
}

pub fn bounce_message() -> Value {
    json!({
        "notificationType": "Bounce",
        "bounce": {
            "bounceType": "Permanent",
            "bounceSubType": "General",
            "reportingMTA": "dsn; a8-70.smtp-out.amazonses.com",
            "bouncedRecipients": [
                {
                    "emailAddress": "username@example.com",
                    "status": "5.1.1",
                    "action": "failed",
                    "diagnosticCode": "smtp; 550 5.1.1 <username@example.com>... User"
                },
                {
                    "emailAddress": "other@example.com",
                    "status": "5.2.2",
                    "action": "failed",
                    "diagnosticCode": "smtp; 552 5.2.2 Mailbox full"
                }
            ],
            "timestamp": "2012-06-19T01:07:52.000Z",
            "feedbackId": "00000138111222aa-33322211-cccc-cccc-cccc-ddddaaaa068a-000000"
        },
        "mail": mail_object(&["username@example.com", "other@example.com"])
    })
}

pub fn bounce_notification() -> Value {
    signed_notification(&bounce_message())
}

pub fn subscription_notification() -> Value {
    sign_notification(json!({
        "Type": "SubscriptionConfirmation",
        "MessageId": "165545c9-2a5c-472c-8df2-7ff2be2b3b1b",
        "Token": "2336412f37fb687f5d51e6e241d164b0",
        "TopicArn": TOPIC_ARN,
        "Message": "You have chosen to subscribe to the topic arn:aws:sns:us-east-1:123456789012:ses-feedback.\nTo confirm the subscription, visit the SubscribeURL included in this message. Try encode £.",
        "SubscribeURL": SUBSCRIBE_URL,
        "Timestamp": "2012-04-26T20:45:04.751Z",
        "SignatureVersion": "1",
        "Signature": "",
        "SigningCertURL": CERT_URL
    }))
}

/// A standalone Send record for sink tests.
pub fn send_record(address: &str) -> FeedbackRecord {
    FeedbackRecord::Send(SendRecord {
        envelope: FeedbackEnvelope {
            topic_id: TOPIC_ARN.to_string(),
            provider_message_id: "f34c6922-c3a1-54a1-bd88-23f998b43978".to_string(),
            mail_timestamp: clean_time("2016-10-14T05:02:16.645Z", true).unwrap(),
            mail_id: "MID1".to_string(),
            mail_from: "a@example.com".to_string(),
            address: address.to_string(),
            feedback_id: None,
            feedback_timestamp: None,
        },
    })
}
