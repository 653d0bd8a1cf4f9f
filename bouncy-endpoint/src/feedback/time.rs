//! Timestamp normalization for SES event fields.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;

/// A point in time as stored on feedback records.
///
/// Deployments that do not work with timezone-aware values get the UTC
/// wall-clock time with the zone dropped, never a local-time reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FeedbackTime {
    Aware(DateTime<Utc>),
    Naive(NaiveDateTime),
}

impl FeedbackTime {
    pub fn as_utc(&self) -> DateTime<Utc> {
        match self {
            FeedbackTime::Aware(t) => *t,
            FeedbackTime::Naive(t) => t.and_utc(),
        }
    }
}

impl fmt::Display for FeedbackTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackTime::Aware(t) => write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            FeedbackTime::Naive(t) => write!(f, "{}", t.format("%Y-%m-%dT%H:%M:%S%.3f")),
        }
    }
}

/// Parse an SES timestamp such as `2016-10-14T05:02:16.645Z`.
///
/// Offsets other than `Z` are honored and converted to UTC. Timestamps
/// without a zone are rejected rather than guessed.
pub fn clean_time(raw: &str, use_tz: bool) -> Result<FeedbackTime, chrono::ParseError> {
    let parsed = DateTime::parse_from_rfc3339(raw.trim())?.with_timezone(&Utc);
    if use_tz {
        Ok(FeedbackTime::Aware(parsed))
    } else {
        Ok(FeedbackTime::Naive(parsed.naive_utc()))
    }
}
