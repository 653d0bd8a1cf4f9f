//! Configuration module for environment variable parsing.
//!
//! Every knob of the endpoint comes from the process environment. Unset or
//! unparseable values fall back to the defaults documented on each field.

use std::env;
use tracing::warn;

/// Default host pattern for SNS certificate and subscription URLs.
pub const DEFAULT_SNS_DOMAIN_REGEX: &str = r"sns.[a-z0-9\-]+.amazonaws.com$";

/// Which backend holds fetched signing certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    /// Process-local map, lives as long as the server
    Memory,
    /// Never cache; every verification refetches the certificate
    Disabled,
}

impl CacheBackend {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" | "default" => Some(CacheBackend::Memory),
            "none" | "disabled" | "off" => Some(CacheBackend::Disabled),
            _ => None,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Route the SNS subscription posts to
    pub endpoint_path: String,

    /// Optional allow-list of topic ARNs accepted in the `x-amz-sns-topic-arn` header
    pub topic_arns: Option<Vec<String>>,

    /// Regex the signing certificate URL host must match
    pub cert_domain_regex: String,

    /// Regex the SubscribeURL host must match before it is visited
    pub subscribe_domain_regex: String,

    /// Whether SubscriptionConfirmation messages are confirmed automatically
    pub auto_subscribe: bool,

    /// Whether SNS signatures are verified. Only disable for local testing.
    pub verify_certificate: bool,

    /// Certificate cache backend
    pub key_cache: CacheBackend,

    /// Keep timestamps timezone-aware; when false they become naive UTC
    pub use_tz: bool,

    /// HTTP request timeout in milliseconds for outbound fetches
    pub request_timeout_ms: u64,

    /// RabbitMQ URL; when set, feedback records are published there
    pub feedback_amqp_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            endpoint_path: "/webhooks/ses".to_string(),
            topic_arns: None,
            cert_domain_regex: DEFAULT_SNS_DOMAIN_REGEX.to_string(),
            subscribe_domain_regex: DEFAULT_SNS_DOMAIN_REGEX.to_string(),
            auto_subscribe: true,
            verify_certificate: true,
            key_cache: CacheBackend::Memory,
            use_tz: true,
            request_timeout_ms: 8000,
            feedback_amqp_url: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),

            endpoint_path: env::var("BOUNCY_ENDPOINT_PATH")
                .ok()
                .filter(|v| v.starts_with('/'))
                .unwrap_or(defaults.endpoint_path),

            topic_arns: parse_csv("BOUNCY_TOPIC_ARN"),

            cert_domain_regex: env::var("BOUNCY_CERT_DOMAIN_REGEX")
                .unwrap_or(defaults.cert_domain_regex),

            subscribe_domain_regex: env::var("BOUNCY_SUBSCRIBE_DOMAIN_REGEX")
                .unwrap_or(defaults.subscribe_domain_regex),

            auto_subscribe: parse_bool("BOUNCY_AUTO_SUBSCRIBE", defaults.auto_subscribe),

            verify_certificate: parse_bool(
                "BOUNCY_VERIFY_CERTIFICATE",
                defaults.verify_certificate,
            ),

            key_cache: match env::var("BOUNCY_KEY_CACHE") {
                Ok(raw) => CacheBackend::parse(&raw).unwrap_or_else(|| {
                    warn!(env_var = "BOUNCY_KEY_CACHE", value = %raw, "Unknown cache backend, using memory");
                    defaults.key_cache
                }),
                Err(_) => defaults.key_cache,
            },

            use_tz: parse_bool("BOUNCY_USE_TZ", defaults.use_tz),

            request_timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.request_timeout_ms),

            feedback_amqp_url: env::var("FEEDBACK_AMQP_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }
}

/// Parse a boolean flag such as "true", "0" or "off".
fn parse_bool(name: &str, default: bool) -> bool {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid boolean, using default");
            default
        }
    }
}

/// Parse a comma-separated list of strings.
fn parse_csv(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}
