//! Record persistence and observer notification.
//!
//! Observers are handed to the [`Dispatcher`] at construction and called in
//! registration order, synchronously, on the request task.

pub mod store;

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::error::StoreError;
use crate::feedback::{Classification, FeedbackRecord};
use crate::sns::SubscriptionResult;

pub use store::{FeedbackStore, LogStore, MemoryStore};

/// One persisted record together with the messages it came from.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackEvent<'a> {
    pub record: &'a FeedbackRecord,
    /// Decoded SES event
    pub message: &'a Value,
    /// Outer SNS envelope as delivered
    pub notification: &'a Value,
}

/// Callbacks for things the endpoint has accepted. All default to no-ops.
pub trait NotificationObserver: Send + Sync {
    /// A notification passed the gate and signature verification.
    fn on_notification(&self, _notification: &Value) {}

    /// A subscription confirmation URL was visited.
    fn on_subscription(&self, _result: &SubscriptionResult, _notification: &Value) {}

    /// A feedback record was persisted.
    fn on_feedback(&self, _event: &FeedbackEvent<'_>) {}
}

/// Logs a one-line summary of every persisted record.
pub struct LoggingObserver;

impl NotificationObserver for LoggingObserver {
    fn on_subscription(&self, result: &SubscriptionResult, _notification: &Value) {
        info!(
            subscribe_url = %result.subscribe_url,
            confirmed = result.confirmed(),
            "sns_subscription_observed"
        );
    }

    fn on_feedback(&self, event: &FeedbackEvent<'_>) {
        info!(
            kind = event.record.kind().label(),
            summary = %event.record,
            "feedback_recorded"
        );
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn FeedbackStore>,
    observers: Vec<Arc<dyn NotificationObserver>>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn FeedbackStore>, observers: Vec<Arc<dyn NotificationObserver>>) -> Self {
        Self { store, observers }
    }

    pub fn notification_verified(&self, notification: &Value) {
        for observer in &self.observers {
            observer.on_notification(notification);
        }
    }

    pub fn subscription_attempted(&self, result: &SubscriptionResult, notification: &Value) {
        for observer in &self.observers {
            observer.on_subscription(result, notification);
        }
    }

    /// Persist and announce each record in order.
    ///
    /// Stops at the first store failure; observers already notified for
    /// earlier records are not rolled back.
    pub async fn dispatch(
        &self,
        classification: &Classification,
        message: &Value,
        notification: &Value,
    ) -> Result<(), StoreError> {
        for record in &classification.records {
            self.store.save(record).await?;

            let event = FeedbackEvent {
                record,
                message,
                notification,
            };
            for observer in &self.observers {
                observer.on_feedback(&event);
            }
        }

        info!(
            kind = classification.kind.label(),
            count = classification.records.len(),
            "feedback_dispatched"
        );

        Ok(())
    }
}
