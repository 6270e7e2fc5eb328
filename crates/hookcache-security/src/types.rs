//! Validator inputs and outputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rate_limit::{LimitType, RateLimitStatus};
use crate::signature::SignatureAlgorithm;

/// Security score weights (sum to 100).
pub const SIGNATURE_WEIGHT: u8 = 40;
pub const SOURCE_WEIGHT: u8 = 20;
pub const RATE_LIMIT_WEIGHT: u8 = 15;
pub const PAYLOAD_SIZE_WEIGHT: u8 = 15;
pub const TIMESTAMP_WEIGHT: u8 = 10;

/// Metadata about the delivering client, captured by the HTTP receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip: String,
    #[serde(default)]
    pub user_agent: String,
    /// Delivery timestamp claimed by the sender (Unix millis).
    pub timestamp_ms: i64,
}

impl ClientInfo {
    /// Client info stamped with the current time.
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    pub fn with_timestamp_ms(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }
}

/// Outcome of each individual check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDetails {
    pub signature_valid: bool,
    pub source_allowed: bool,
    pub rate_limit_ok: bool,
    pub payload_size_ok: bool,
    pub timestamp_valid: bool,
}

impl CheckDetails {
    pub fn all_passed(&self) -> bool {
        self.signature_valid
            && self.source_allowed
            && self.rate_limit_ok
            && self.payload_size_ok
            && self.timestamp_valid
    }

    /// Weighted score used for triage, 0..=100.
    pub fn score(&self) -> u8 {
        [
            (self.signature_valid, SIGNATURE_WEIGHT),
            (self.source_allowed, SOURCE_WEIGHT),
            (self.rate_limit_ok, RATE_LIMIT_WEIGHT),
            (self.payload_size_ok, PAYLOAD_SIZE_WEIGHT),
            (self.timestamp_valid, TIMESTAMP_WEIGHT),
        ]
        .iter()
        .filter(|(passed, _)| *passed)
        .map(|(_, weight)| weight)
        .sum()
    }
}

/// Why a webhook was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("payload too large: {size} bytes exceeds {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("timestamp outside tolerance: skew {skew_ms}ms, allowed {tolerance_ms}ms")]
    StaleTimestamp { skew_ms: i64, tolerance_ms: i64 },

    #[error("rate limit exceeded: {limit_type}")]
    RateLimited {
        limit_type: LimitType,
        reset_at: DateTime<Utc>,
    },

    #[error("source not allowed: {ip}")]
    SourceNotAllowed { ip: String },

    #[error("invalid signature: {detail}")]
    InvalidSignature { detail: String },

    #[error("internal validation error: {message}")]
    Internal { message: String },
}

impl RejectReason {
    /// Whether re-sending the same delivery later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Time until a rate-limited client may retry.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        match self {
            Self::RateLimited { reset_at, .. } => {
                Some((*reset_at - now).to_std().unwrap_or_default())
            }
            _ => None,
        }
    }
}

/// Result of validating one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True only when every check passed.
    pub valid: bool,
    pub security_score: u8,
    /// Per-minute budget left for this client.
    pub remaining: u32,
    pub details: CheckDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_algorithm: Option<SignatureAlgorithm>,
    pub processing_time_us: u64,
}

impl ValidationResult {
    pub(crate) fn from_checks(details: CheckDetails, remaining: u32) -> Self {
        Self {
            valid: details.all_passed(),
            security_score: details.score(),
            remaining,
            details,
            reason: None,
            rate_limit: None,
            signature_algorithm: None,
            processing_time_us: 0,
        }
    }

    pub(crate) fn rejected(details: CheckDetails, remaining: u32, reason: RejectReason) -> Self {
        let mut result = Self::from_checks(details, remaining);
        result.valid = false;
        result.reason = Some(reason);
        result
    }
}
