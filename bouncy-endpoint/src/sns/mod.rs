//! SNS transport: gating, signature verification and subscription handling.
//!
//! ```text
//! request → NotificationGate → SignatureVerifier (via CertificateStore) → SnsNotification
//! ```

pub mod certificate;
pub mod gate;
pub mod notification;
pub mod signature;
pub mod subscription;

pub use certificate::{key_cache_for, CertificateStore, KeyCache, MemoryKeyCache, NoKeyCache};
pub use gate::{GateRejection, NotificationGate, TOPIC_ARN_HEADER};
pub use notification::{NotificationType, SnsNotification};
pub use signature::SignatureVerifier;
pub use subscription::{ApprovalOutcome, SubscriptionApprover, SubscriptionResult};
