//! Request processing: gate → verify → classify → dispatch.
//!
//! Everything here is transport-agnostic; the web layer only turns an
//! [`Outcome`] into an HTTP response and a [`ProcessError`] into a 500.

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::{Dispatcher, FeedbackStore, NotificationObserver};
use crate::error::{ClassifyError, ProcessError};
use crate::feedback::Classifier;
use crate::fetch::Fetcher;
use crate::sns::{
    key_cache_for, ApprovalOutcome, CertificateStore, NotificationGate, NotificationType,
    SignatureVerifier, SnsNotification, SubscriptionApprover,
};

/// Status and fixed body answered to SNS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: StatusCode,
    pub body: String,
}

impl Outcome {
    fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    fn ok(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, body)
    }
}

pub struct Processor {
    gate: NotificationGate,
    /// `None` when signature verification is switched off
    verifier: Option<SignatureVerifier>,
    approver: SubscriptionApprover,
    auto_subscribe: bool,
    classifier: Classifier,
    dispatcher: Dispatcher,
}

impl Processor {
    /// Build the pipeline described by `config`.
    ///
    /// Fails only when one of the configured domain patterns is not a valid
    /// regex.
    pub fn from_config(
        config: &Config,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn FeedbackStore>,
        observers: Vec<Arc<dyn NotificationObserver>>,
    ) -> Result<Self, regex::Error> {
        let gate = NotificationGate::new(config.topic_arns.clone(), &config.cert_domain_regex)?;
        let approver = SubscriptionApprover::new(fetcher.clone(), &config.subscribe_domain_regex)?;

        let verifier = if config.verify_certificate {
            let certificates = CertificateStore::new(key_cache_for(config.key_cache), fetcher);
            Some(SignatureVerifier::new(certificates))
        } else {
            warn!("sns_signature_verification_disabled");
            None
        };

        Ok(Self {
            gate,
            verifier,
            approver,
            auto_subscribe: config.auto_subscribe,
            classifier: Classifier::new(config.use_tz),
            dispatcher: Dispatcher::new(store, observers),
        })
    }

    /// Process one inbound request.
    ///
    /// `Err` means the endpoint itself failed (certificate unusable, sink
    /// down) and SNS should retry; every other outcome is final.
    pub async fn handle(
        &self,
        method: &Method,
        topic_header: Option<&str>,
        body: &[u8],
    ) -> Result<Outcome, ProcessError> {
        let notification = match self.gate.check(method, topic_header, body) {
            Ok(n) => n,
            Err(rejection) => return Ok(Outcome::new(rejection.status(), rejection.body())),
        };

        info!(
            message_id = %notification.message_id(),
            notification_type = notification.kind().as_str(),
            topic_arn = %notification.topic_arn(),
            "sns_notification_received"
        );

        match &self.verifier {
            Some(verifier) => {
                if !verifier.verify(&notification).await? {
                    warn!(
                        message_id = %notification.message_id(),
                        signing_cert_url = %notification.signing_cert_url(),
                        "sns_signature_invalid"
                    );
                    return Ok(Outcome::new(StatusCode::BAD_REQUEST, "Improper Signature"));
                }
            }
            None => {
                warn!(
                    message_id = %notification.message_id(),
                    "sns_signature_verification_skipped"
                );
            }
        }

        let raw = notification.to_value();
        self.dispatcher.notification_verified(&raw);

        match notification.kind() {
            NotificationType::SubscriptionConfirmation => {
                Ok(self.approve_subscription(&notification, &raw).await)
            }
            NotificationType::UnsubscribeConfirmation => {
                info!(
                    message_id = %notification.message_id(),
                    topic_arn = %notification.topic_arn(),
                    "sns_unsubscribe_confirmation_ignored"
                );
                Ok(Outcome::ok("UnsubscribeConfirmation Not Handled"))
            }
            NotificationType::Notification => self.process_feedback(&notification, &raw).await,
        }
    }

    async fn approve_subscription(&self, notification: &SnsNotification, raw: &Value) -> Outcome {
        if !self.auto_subscribe {
            info!(
                message_id = %notification.message_id(),
                "sns_subscription_auto_confirm_disabled"
            );
            return Outcome::new(StatusCode::NOT_FOUND, "");
        }

        match self.approver.approve(notification).await {
            ApprovalOutcome::ImproperDomain => {
                Outcome::new(StatusCode::BAD_REQUEST, "Improper Subscription Domain")
            }
            ApprovalOutcome::Attempted(result) => {
                self.dispatcher.subscription_attempted(&result, raw);
                Outcome::ok(result.body)
            }
        }
    }

    async fn process_feedback(
        &self,
        notification: &SnsNotification,
        raw: &Value,
    ) -> Result<Outcome, ProcessError> {
        // The gate guarantees the key exists, not that it holds a string
        let message = match notification
            .message()
            .ok_or(ClassifyError::MissingVitalFields)
            .and_then(Classifier::parse_message)
        {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    message_id = %notification.message_id(),
                    error = %e,
                    "ses_message_invalid_json"
                );
                return Ok(Outcome::ok("Message is not valid JSON"));
            }
        };

        let classification = match self.classifier.classify(&message, notification) {
            Ok(c) => c,
            Err(e) => {
                if matches!(e, ClassifyError::UnknownType(_)) {
                    info!(message_id = %notification.message_id(), error = %e, "ses_event_skipped");
                } else {
                    warn!(message_id = %notification.message_id(), error = %e, "ses_event_invalid");
                }
                return Ok(Outcome::ok(e.acknowledgment()));
            }
        };

        self.dispatcher.dispatch(&classification, &message, raw).await?;

        Ok(Outcome::ok(classification.kind.acknowledgment()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use crate::dispatch::{FeedbackEvent, MemoryStore};
    use crate::error::StoreError;
    use crate::feedback::{FeedbackKind, FeedbackRecord};
    use crate::sns::SubscriptionResult;
    use crate::test_support::{
        bounce_notification, sign_notification, signed_notification, subscription_notification,
        MockFetcher, CERT_URL, SIGNING_CERT_PEM, SUBSCRIBE_URL, TOPIC_ARN,
    };

    const CONFIRMATION: &[u8] = b"<ConfirmSubscriptionResponse/>";

    #[derive(Default)]
    struct CountingObserver {
        notifications: AtomicUsize,
        subscriptions: AtomicUsize,
        feedback: AtomicUsize,
    }

    impl NotificationObserver for CountingObserver {
        fn on_notification(&self, _notification: &Value) {
            self.notifications.fetch_add(1, Ordering::SeqCst);
        }

        fn on_subscription(&self, _result: &SubscriptionResult, _notification: &Value) {
            self.subscriptions.fetch_add(1, Ordering::SeqCst);
        }

        fn on_feedback(&self, _event: &FeedbackEvent<'_>) {
            self.feedback.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl FeedbackStore for BrokenStore {
        async fn save(&self, _record: &FeedbackRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection reset".to_string()))
        }
    }

    struct Harness {
        processor: Processor,
        store: Arc<MemoryStore>,
        observer: Arc<CountingObserver>,
        fetcher: Arc<MockFetcher>,
    }

    fn harness(config: Config) -> Harness {
        let fetcher = Arc::new(
            MockFetcher::ok(SIGNING_CERT_PEM.as_bytes()).route(SUBSCRIBE_URL, 200, CONFIRMATION),
        );
        harness_with(config, fetcher)
    }

    fn harness_with(config: Config, fetcher: Arc<MockFetcher>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let observer = Arc::new(CountingObserver::default());
        let processor =
            Processor::from_config(&config, fetcher.clone(), store.clone(), vec![observer.clone()])
                .unwrap();
        Harness {
            processor,
            store,
            observer,
            fetcher,
        }
    }

    async fn post(processor: &Processor, body: &Value) -> Result<Outcome, ProcessError> {
        processor
            .handle(&Method::POST, Some(TOPIC_ARN), body.to_string().as_bytes())
            .await
    }

    #[tokio::test]
    async fn test_bounce_end_to_end() {
        let h = harness(Config::default());

        let outcome = post(&h.processor, &bounce_notification()).await.unwrap();

        assert_eq!(outcome, Outcome::ok("Bounce Processed"));
        let records = h.store.records().await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.kind() == FeedbackKind::Bounce));
        assert_eq!(h.observer.notifications.load(Ordering::SeqCst), 1);
        assert_eq!(h.observer.feedback.load(Ordering::SeqCst), 2);
        assert_eq!(h.fetcher.urls(), vec![CERT_URL.to_string()]);
    }

    #[tokio::test]
    async fn test_replay_is_not_deduplicated() {
        let h = harness(Config::default());
        let body = bounce_notification();

        let first = post(&h.processor, &body).await.unwrap();
        let second = post(&h.processor, &body).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.body, "Bounce Processed");
        assert_eq!(h.store.len().await, 4);
        // Certificate served from cache the second time
        assert_eq!(h.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_send_scenario() {
        let h = harness(Config::default());
        let message = json!({
            "eventType": "Send",
            "mail": {
                "timestamp": "2016-10-14T05:02:16.645Z",
                "messageId": "MID1",
                "source": "a@example.com",
                "destination": ["b@example.com", "c@example.com"]
            }
        });

        let outcome = post(&h.processor, &signed_notification(&message)).await.unwrap();

        assert_eq!(outcome, Outcome::ok("Send Processed"));
        let addresses: Vec<String> = h
            .store
            .records()
            .await
            .iter()
            .map(|r| r.address().to_string())
            .collect();
        assert_eq!(addresses, vec!["b@example.com", "c@example.com"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_confirmation_not_handled() {
        let h = harness(Config::default());
        let mut raw = subscription_notification();
        raw["Type"] = json!("UnsubscribeConfirmation");
        let raw = sign_notification(raw);

        let outcome = post(&h.processor, &raw).await.unwrap();

        assert_eq!(outcome, Outcome::ok("UnsubscribeConfirmation Not Handled"));
        assert_eq!(h.store.len().await, 0);
        assert_eq!(h.observer.subscriptions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_signature_rejected_before_side_effects() {
        let h = harness(Config::default());
        let mut raw = bounce_notification();
        raw["Message"] = json!(raw["Message"].as_str().unwrap().replace("Permanent", "Transient"));

        let outcome = post(&h.processor, &raw).await.unwrap();

        assert_eq!(outcome, Outcome::new(StatusCode::BAD_REQUEST, "Improper Signature"));
        assert_eq!(h.store.len().await, 0);
        assert_eq!(h.observer.notifications.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_verification_can_be_disabled() {
        let config = Config {
            verify_certificate: false,
            ..Config::default()
        };
        let h = harness(config);
        let mut raw = bounce_notification();
        raw["Signature"] = json!("bm90IGEgc2lnbmF0dXJl");

        let outcome = post(&h.processor, &raw).await.unwrap();

        assert_eq!(outcome, Outcome::ok("Bounce Processed"));
        assert_eq!(h.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_subscription_confirmed() {
        let h = harness(Config::default());

        let outcome = post(&h.processor, &subscription_notification()).await.unwrap();

        assert_eq!(outcome, Outcome::ok("<ConfirmSubscriptionResponse/>"));
        assert_eq!(h.fetcher.urls(), vec![CERT_URL.to_string(), SUBSCRIBE_URL.to_string()]);
        assert_eq!(h.observer.subscriptions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscription_http_error_still_ok() {
        let fetcher = Arc::new(
            MockFetcher::ok(SIGNING_CERT_PEM.as_bytes())
                .route(SUBSCRIBE_URL, 403, b"<Error>AuthorizationError</Error>"),
        );
        let h = harness_with(Config::default(), fetcher);

        let outcome = post(&h.processor, &subscription_notification()).await.unwrap();

        assert_eq!(outcome, Outcome::ok("<Error>AuthorizationError</Error>"));
    }

    #[tokio::test]
    async fn test_subscription_disabled_is_not_found() {
        let config = Config {
            auto_subscribe: false,
            ..Config::default()
        };
        let h = harness(config);

        let outcome = post(&h.processor, &subscription_notification()).await.unwrap();

        assert_eq!(outcome, Outcome::new(StatusCode::NOT_FOUND, ""));
        assert_eq!(h.fetcher.urls(), vec![CERT_URL.to_string()]);
    }

    #[tokio::test]
    async fn test_subscription_improper_domain() {
        let h = harness(Config::default());
        let mut raw = subscription_notification();
        raw["SubscribeURL"] = json!("https://sns.example.com/?Action=ConfirmSubscription");
        let raw = sign_notification(raw);

        let outcome = post(&h.processor, &raw).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::new(StatusCode::BAD_REQUEST, "Improper Subscription Domain")
        );
        assert_eq!(h.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_soft_acknowledgments() {
        let h = harness(Config::default());

        let not_json = post(&h.processor, &signed_notification(&json!("{not json")))
            .await
            .unwrap();
        let unknown = post(
            &h.processor,
            &signed_notification(&json!({"notificationType": "AmazonSnsSubscriptionSucceeded", "mail": {}})),
        )
        .await
        .unwrap();
        let missing = post(&h.processor, &signed_notification(&json!({"notificationType": "Bounce"})))
            .await
            .unwrap();

        assert_eq!(not_json, Outcome::ok("Message is not valid JSON"));
        assert_eq!(unknown, Outcome::ok("Unknown Notification Type"));
        assert_eq!(missing, Outcome::ok("Missing Vital Fields"));
        assert_eq!(h.store.len().await, 0);
    }

    #[tokio::test]
    async fn test_gate_rejections_pass_through() {
        let config = Config {
            topic_arns: Some(vec![TOPIC_ARN.to_string()]),
            ..Config::default()
        };
        let h = harness(config);

        let get = h.processor.handle(&Method::GET, Some(TOPIC_ARN), b"").await.unwrap();
        let no_header = h.processor.handle(&Method::POST, None, b"{garbage").await.unwrap();

        assert_eq!(get, Outcome::new(StatusCode::NOT_FOUND, ""));
        assert_eq!(no_header, Outcome::new(StatusCode::BAD_REQUEST, "No TopicArn Header"));
        assert_eq!(h.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_certificate_is_hard_failure() {
        let fetcher = Arc::new(MockFetcher::ok(b"-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n"));
        let h = harness_with(Config::default(), fetcher);

        let err = post(&h.processor, &bounce_notification()).await.unwrap_err();

        assert!(matches!(err, ProcessError::Certificate(_)));
        assert_eq!(h.store.len().await, 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_hard_failure() {
        let fetcher = Arc::new(MockFetcher::ok(SIGNING_CERT_PEM.as_bytes()));
        let processor =
            Processor::from_config(&Config::default(), fetcher, Arc::new(BrokenStore), Vec::new())
                .unwrap();

        let err = post(&processor, &bounce_notification()).await.unwrap_err();

        assert!(matches!(err, ProcessError::Store(_)));
    }

    #[test]
    fn test_invalid_domain_regex_rejected() {
        let config = Config {
            cert_domain_regex: "(unclosed".to_string(),
            ..Config::default()
        };
        let fetcher = Arc::new(MockFetcher::failing());

        let result = Processor::from_config(&config, fetcher, Arc::new(MemoryStore::new()), Vec::new());

        assert!(result.is_err());
    }
}
