//! Automatic confirmation of SNS subscriptions.
//!
//! Verification of the URL itself is limited to its host: the message that
//! carried it has already been signature-checked.

use std::sync::Arc;

use regex::Regex;
use tracing::{error, info, warn};

use crate::fetch::Fetcher;
use crate::sns::gate::host_matches;
use crate::sns::notification::SnsNotification;

/// What came back from visiting a SubscribeURL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionResult {
    pub subscribe_url: String,
    /// HTTP status, absent when the request never got a response
    pub status: Option<u16>,
    /// Response body, or the transport error text
    pub body: String,
}

impl SubscriptionResult {
    pub fn confirmed(&self) -> bool {
        matches!(self.status, Some(s) if (200..300).contains(&s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// SubscribeURL missing or outside the allowed domain; nothing was sent
    ImproperDomain,
    Attempted(SubscriptionResult),
}

/// Visits SubscribeURLs, once per confirmation message.
#[derive(Clone)]
pub struct SubscriptionApprover {
    fetcher: Arc<dyn Fetcher>,
    subscribe_domain: Regex,
}

impl SubscriptionApprover {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        subscribe_domain_regex: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            fetcher,
            subscribe_domain: Regex::new(subscribe_domain_regex)?,
        })
    }

    /// Confirm the subscription announced by `notification`.
    ///
    /// A single GET is issued. HTTP and transport failures are logged and
    /// reported in the result rather than retried: SNS redelivers the
    /// confirmation if it wants another attempt.
    pub async fn approve(&self, notification: &SnsNotification) -> ApprovalOutcome {
        let url = notification.subscribe_url().unwrap_or_default();

        if !host_matches(&self.subscribe_domain, url) {
            error!(subscribe_url = %url, "sns_subscription_domain_invalid");
            return ApprovalOutcome::ImproperDomain;
        }

        let result = match self.fetcher.get(url).await {
            Ok(response) => {
                let result = SubscriptionResult {
                    subscribe_url: url.to_string(),
                    status: Some(response.status),
                    body: response.text(),
                };
                if result.confirmed() {
                    info!(subscribe_url = %url, "sns_subscription_request_sent");
                } else {
                    warn!(
                        subscribe_url = %url,
                        status_code = response.status,
                        body = %result.body,
                        "sns_subscription_http_error"
                    );
                }
                result
            }
            Err(e) => {
                warn!(subscribe_url = %url, error = %e, "sns_subscription_request_failed");
                SubscriptionResult {
                    subscribe_url: url.to_string(),
                    status: None,
                    body: e.to_string(),
                }
            }
        };

        ApprovalOutcome::Attempted(result)
    }
}
