//! SNS message signature verification.
//!
//! SNS signs a canonical rendering of selected message fields with the
//! private key behind `SigningCertURL`.
//! Reference: https://docs.aws.amazon.com/sns/latest/dg/sns-verify-signature-of-message.html

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha1::Sha1;
use sha2::Sha256;
use tracing::warn;
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

use crate::error::CertificateError;
use crate::sns::certificate::CertificateStore;
use crate::sns::notification::{NotificationType, SnsNotification};

/// Signed fields of a subscription or unsubscribe confirmation, in order.
const SUBSCRIPTION_FIELDS: &[&str] = &[
    "Message",
    "MessageId",
    "SubscribeURL",
    "Timestamp",
    "Token",
    "TopicArn",
    "Type",
];

/// Signed fields of a notification without a subject, in order.
const NOTIFICATION_FIELDS: &[&str] = &["Message", "MessageId", "Timestamp", "TopicArn", "Type"];

/// Signed fields of a notification carrying a subject, in order.
const NOTIFICATION_WITH_SUBJECT_FIELDS: &[&str] = &[
    "Message",
    "MessageId",
    "Subject",
    "Timestamp",
    "TopicArn",
    "Type",
];

/// Field list that the signature of `notification` covers.
pub fn signed_fields(notification: &SnsNotification) -> &'static [&'static str] {
    match notification.kind() {
        NotificationType::Notification if notification.has_field("Subject") => {
            NOTIFICATION_WITH_SUBJECT_FIELDS
        }
        NotificationType::Notification => NOTIFICATION_FIELDS,
        NotificationType::SubscriptionConfirmation | NotificationType::UnsubscribeConfirmation => {
            SUBSCRIPTION_FIELDS
        }
    }
}

/// Build the newline-delimited string-to-sign.
///
/// Returns `None` when a signed field is missing or not a string; such a
/// message cannot carry a valid signature.
pub fn canonical_string(notification: &SnsNotification) -> Option<String> {
    let mut canonical = String::new();
    for name in signed_fields(notification) {
        let value = notification.field(name)?;
        canonical.push_str(name);
        canonical.push('\n');
        canonical.push_str(value);
        canonical.push('\n');
    }
    Some(canonical)
}

/// Extract the RSA public key of the single certificate in `pem_bytes`.
pub fn public_key_from_pem(pem_bytes: &[u8]) -> Result<RsaPublicKey, CertificateError> {
    let blocks =
        pem::parse_many(pem_bytes).map_err(|e| CertificateError::Malformed(e.to_string()))?;
    let block = blocks
        .iter()
        .find(|block| block.tag() == "CERTIFICATE")
        .ok_or_else(|| CertificateError::Malformed("no CERTIFICATE block".to_string()))?;
    let certificate = Certificate::from_der(block.contents())
        .map_err(|e| CertificateError::Malformed(e.to_string()))?;

    let spki_der = certificate
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| CertificateError::Malformed(e.to_string()))?;

    RsaPublicKey::from_public_key_der(&spki_der)
        .map_err(|e| CertificateError::UnsupportedKey(e.to_string()))
}

/// Check an RSA PKCS#1 v1.5 signature for the given SNS signature version.
///
/// Version "1" signs with SHA-1, version "2" with SHA-256.
pub fn verify_signature(
    key: &RsaPublicKey,
    signature_version: &str,
    payload: &[u8],
    signature: &[u8],
) -> bool {
    let signature = match Signature::try_from(signature) {
        Ok(s) => s,
        Err(_) => return false,
    };

    match signature_version {
        "1" => VerifyingKey::<Sha1>::new(key.clone())
            .verify(payload, &signature)
            .is_ok(),
        "2" => VerifyingKey::<Sha256>::new(key.clone())
            .verify(payload, &signature)
            .is_ok(),
        other => {
            warn!(signature_version = %other, "sns_signature_version_unsupported");
            false
        }
    }
}

/// Verifies notifications against certificates from the cache.
#[derive(Clone)]
pub struct SignatureVerifier {
    certificates: CertificateStore,
}

impl SignatureVerifier {
    pub fn new(certificates: CertificateStore) -> Self {
        Self { certificates }
    }

    /// `Ok(false)` for any signature that does not check out. `Err` only when
    /// the signing certificate itself cannot be obtained or decoded.
    pub async fn verify(&self, notification: &SnsNotification) -> Result<bool, CertificateError> {
        let pem = self
            .certificates
            .fetch(notification.signing_cert_url())
            .await?;
        let key = public_key_from_pem(&pem)?;

        let canonical = match canonical_string(notification) {
            Some(c) => c,
            None => {
                warn!(
                    message_id = %notification.message_id(),
                    notification_type = notification.kind().as_str(),
                    "sns_signature_fields_missing"
                );
                return Ok(false);
            }
        };

        let signature = match BASE64.decode(notification.signature().trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    message_id = %notification.message_id(),
                    error = %e,
                    "sns_signature_not_base64"
                );
                return Ok(false);
            }
        };

        let version = notification.signature_version().unwrap_or("1");
        Ok(verify_signature(&key, version, canonical.as_bytes(), &signature))
    }
}
