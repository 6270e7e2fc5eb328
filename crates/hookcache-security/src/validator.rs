//! Webhook validation pipeline.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. payload size
//! 2. timestamp freshness (replay window)
//! 3. rate limits (burst, per minute, per hour)
//! 4. source allow-list
//! 5. HMAC signature
//!
//! Every outcome is recorded in the [`SecurityEventLog`]. Validation never
//! returns an error: internal failures become `valid == false` with a
//! critical event.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::config::SecurityConfig;
use crate::error::{SecurityError, SecurityResult};
use crate::events::{SecurityEvent, SecurityEventLog, SecurityEventType, Severity};
use crate::rate_limit::{RateDecision, RateLimitStore};
use crate::signature::{self, SignatureAlgorithm, SignatureError};
use crate::source::{self, SourcePolicy};
use crate::types::{CheckDetails, ClientInfo, RejectReason, ValidationResult};

/// Validates inbound webhook deliveries.
#[derive(Debug, Clone)]
pub struct WebhookValidator {
    config: Arc<SecurityConfig>,
    algorithms: Vec<SignatureAlgorithm>,
    sources: SourcePolicy,
    rate_limits: Arc<RateLimitStore>,
    events: Arc<SecurityEventLog>,
}

impl WebhookValidator {
    /// Validator with its own rate-limit store and in-memory event log.
    pub fn new(config: SecurityConfig) -> SecurityResult<Self> {
        let rate_limits = Arc::new(RateLimitStore::new(config.rate_limits.clone()));
        let events = Arc::new(SecurityEventLog::new(config.event_log_capacity));
        Self::with_state(config, rate_limits, events)
    }

    /// Validator over explicitly owned shared state.
    pub fn with_state(
        config: SecurityConfig,
        rate_limits: Arc<RateLimitStore>,
        events: Arc<SecurityEventLog>,
    ) -> SecurityResult<Self> {
        config.validate()?;
        let sources = SourcePolicy::parse(&config.allowed_sources)?;
        let algorithms = config
            .signature_algorithms
            .iter()
            .filter_map(|name| SignatureAlgorithm::parse(name))
            .collect();

        Ok(Self {
            config: Arc::new(config),
            algorithms,
            sources,
            rate_limits,
            events,
        })
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<SecurityEventLog> {
        &self.events
    }

    pub fn rate_limits(&self) -> &Arc<RateLimitStore> {
        &self.rate_limits
    }

    /// Signature header value for `payload` under the configured secret.
    pub fn sign(&self, payload: &[u8], algorithm: SignatureAlgorithm) -> SecurityResult<String> {
        signature::sign(self.config.hmac_secret.as_bytes(), payload, algorithm)
            .map_err(|e| SecurityError::internal(e.to_string()))
    }

    /// Validate a delivery against the current time.
    pub fn validate(
        &self,
        payload: &[u8],
        headers: &HashMap<String, String>,
        client: &ClientInfo,
    ) -> ValidationResult {
        self.validate_at(payload, headers, client, Utc::now())
    }

    /// Validate a delivery as if received at `now`.
    pub fn validate_at(
        &self,
        payload: &[u8],
        headers: &HashMap<String, String>,
        client: &ClientInfo,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        let started = Instant::now();

        let mut result = match self.run_checks(payload, headers, client, now, started) {
            Ok(result) => result,
            Err(e) => {
                self.record(
                    SecurityEventType::ValidationFailure,
                    Severity::Critical,
                    client,
                    json!({ "reason": "internal_error", "error": e.to_string() }),
                );
                ValidationResult::rejected(
                    CheckDetails::default(),
                    0,
                    RejectReason::Internal {
                        message: e.to_string(),
                    },
                )
            }
        };

        result.processing_time_us = elapsed_us(started);
        result
    }

    fn run_checks(
        &self,
        payload: &[u8],
        headers: &HashMap<String, String>,
        client: &ClientInfo,
        now: DateTime<Utc>,
        started: Instant,
    ) -> SecurityResult<ValidationResult> {
        let mut details = CheckDetails::default();

        let max = self.config.max_payload_bytes;
        if payload.len() > max {
            self.record(
                SecurityEventType::SecurityViolation,
                Severity::High,
                client,
                json!({
                    "reason": "payload_too_large",
                    "payload_size": payload.len(),
                    "max_payload_size": max,
                }),
            );
            return Ok(ValidationResult::rejected(
                details,
                0,
                RejectReason::PayloadTooLarge {
                    size: payload.len(),
                    max,
                },
            ));
        }
        details.payload_size_ok = true;

        let tolerance_ms = self.config.timestamp_tolerance_ms();
        let skew_ms = now.timestamp_millis().saturating_sub(client.timestamp_ms);
        if skew_ms.saturating_abs() >= tolerance_ms {
            self.record(
                SecurityEventType::SecurityViolation,
                Severity::High,
                client,
                json!({
                    "reason": "stale_timestamp",
                    "skew_ms": skew_ms,
                    "tolerance_ms": tolerance_ms,
                }),
            );
            return Ok(ValidationResult::rejected(
                details,
                0,
                RejectReason::StaleTimestamp {
                    skew_ms,
                    tolerance_ms,
                },
            ));
        }
        details.timestamp_valid = true;

        let client_key = source::client_key(&client.ip);
        let remaining = match self.rate_limits.check_and_record(&client_key, now) {
            RateDecision::Allowed { remaining } => remaining,
            RateDecision::Limited(status) => {
                self.record(
                    SecurityEventType::RateLimitExceeded,
                    Severity::Medium,
                    client,
                    json!({
                        "limit_type": status.limit_type,
                        "current_count": status.current_count,
                        "limit": status.limit,
                        "reset_at": status.reset_at,
                    }),
                );
                let mut result = ValidationResult::rejected(
                    details,
                    0,
                    RejectReason::RateLimited {
                        limit_type: status.limit_type,
                        reset_at: status.reset_at,
                    },
                );
                result.rate_limit = Some(status);
                return Ok(result);
            }
        };
        details.rate_limit_ok = true;

        if !self.sources.allows(&client.ip) {
            self.record(
                SecurityEventType::SecurityViolation,
                Severity::High,
                client,
                json!({ "reason": "source_not_allowed" }),
            );
            return Ok(ValidationResult::rejected(
                details,
                remaining,
                RejectReason::SourceNotAllowed {
                    ip: client.ip.clone(),
                },
            ));
        }
        details.source_allowed = true;

        let algorithm = match signature::verify_signature(
            self.config.hmac_secret.as_bytes(),
            payload,
            headers,
            &self.algorithms,
        ) {
            Ok(algorithm) => algorithm,
            Err(SignatureError::InvalidKey) => {
                return Err(SecurityError::internal("HMAC key rejected"));
            }
            Err(e) => {
                self.record(
                    SecurityEventType::ValidationFailure,
                    Severity::Critical,
                    client,
                    json!({ "reason": "invalid_signature", "detail": e.to_string() }),
                );
                return Ok(ValidationResult::rejected(
                    details,
                    remaining,
                    RejectReason::InvalidSignature {
                        detail: e.to_string(),
                    },
                ));
            }
        };
        details.signature_valid = true;

        self.record(
            SecurityEventType::ValidationSuccess,
            Severity::Low,
            client,
            json!({
                "processing_time_us": elapsed_us(started),
                "payload_size": payload.len(),
                "algorithm": algorithm,
            }),
        );

        let mut result = ValidationResult::from_checks(details, remaining);
        result.signature_algorithm = Some(algorithm);
        Ok(result)
    }

    fn record(
        &self,
        event_type: SecurityEventType,
        severity: Severity,
        client: &ClientInfo,
        details: serde_json::Value,
    ) {
        self.events
            .record(SecurityEvent::new(event_type, severity, client, details));
    }
}

fn elapsed_us(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX)
}
