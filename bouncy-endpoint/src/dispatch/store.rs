//! Persistence sink for feedback records.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::StoreError;
use crate::feedback::FeedbackRecord;

/// Where records go once classified. Implementations must be durable by the
/// time `save` returns `Ok`: SNS is told the message was processed.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn save(&self, record: &FeedbackRecord) -> Result<(), StoreError>;
}

/// Writes each record to the log as one JSON line and keeps nothing.
///
/// For deployments without a broker; the log pipeline is the only copy.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStore;

#[async_trait]
impl FeedbackStore for LogStore {
    async fn save(&self, record: &FeedbackRecord) -> Result<(), StoreError> {
        let body = serde_json::to_string(record)?;
        info!(
            kind = record.kind().label(),
            address = %record.envelope().address,
            record = %body,
            "feedback_logged"
        );
        Ok(())
    }
}

/// In-process, append-only record log. Unbounded; meant for tests and
/// embedding callers that drain it themselves.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<FeedbackRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<FeedbackRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl FeedbackStore for MemoryStore {
    async fn save(&self, record: &FeedbackRecord) -> Result<(), StoreError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::send_record;

    #[tokio::test]
    async fn test_log_store_accepts_records() {
        let store = LogStore;
        store.save(&send_record("a@example.com")).await.unwrap();
        store.save(&send_record("b@example.com")).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_keeps_records_in_order() {
        let store = MemoryStore::new();
        store.save(&send_record("a@example.com")).await.unwrap();
        store.save(&send_record("b@example.com")).await.unwrap();

        let records = store.records().await;
        assert_eq!(store.len().await, 2);
        assert_eq!(records[0].envelope().address, "a@example.com");
        assert_eq!(records[1].envelope().address, "b@example.com");
    }
}
