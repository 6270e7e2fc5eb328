//! End-to-end validator behavior: rejection paths, rate-limit windows and
//! event logging as seen by the webhook receiver.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use hookcache_security::{
    ClientInfo, JsonlEventSink, LimitType, RateLimitConfig, RejectReason, SecurityConfig,
    SecurityEventLog, SecurityEventType, Severity, SignatureAlgorithm, WebhookValidator,
};
use tempfile::TempDir;

const SECRET: &str = "integration-secret";

fn config(per_minute: u32, burst_limit: u32) -> SecurityConfig {
    SecurityConfig {
        rate_limits: RateLimitConfig {
            per_minute,
            per_hour: 10_000,
            burst_limit,
            burst_window_secs: 10,
        },
        ..SecurityConfig::with_secret(SECRET)
    }
}

/// Start of a minute bucket, so offsets below 60s stay in one bucket.
fn minute_start() -> DateTime<Utc> {
    let ms = 1_750_000_000_000_i64;
    Utc.timestamp_millis_opt(ms - ms % 60_000).unwrap()
}

fn signed_headers(validator: &WebhookValidator, payload: &[u8]) -> HashMap<String, String> {
    let value = validator.sign(payload, SignatureAlgorithm::Sha256).unwrap();
    HashMap::from([("x-hub-signature-256".to_string(), value)])
}

fn client_at(ip: &str, at: DateTime<Utc>) -> ClientInfo {
    ClientInfo::new(ip, "workflow-platform/2.1").with_timestamp_ms(at.timestamp_millis())
}

#[test]
fn missing_signature_logs_one_critical_failure() {
    let validator = WebhookValidator::new(config(60, 10)).unwrap();
    let payload = br#"{"event":"workflow.completed"}"#;

    let result = validator.validate(payload, &HashMap::new(), &ClientInfo::new("1.2.3.4", "ua"));

    assert!(!result.valid);
    assert!(!result.details.signature_valid);
    assert!(result.details.payload_size_ok);
    assert!(result.details.rate_limit_ok);
    assert!(result.details.source_allowed);
    assert!(result.details.timestamp_valid);
    assert_eq!(result.security_score, 60);
    assert!(matches!(
        result.reason,
        Some(RejectReason::InvalidSignature { ref detail }) if detail.contains("missing")
    ));

    let events = validator.events().recent(100);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, SecurityEventType::ValidationFailure);
    assert_eq!(events[0].severity, Severity::Critical);
}

#[test]
fn sixty_first_request_in_minute_is_rate_limited() {
    let validator = WebhookValidator::new(config(60, 1_000)).unwrap();
    let payload = b"{}";
    let headers = signed_headers(&validator, payload);
    let start = minute_start();

    for i in 0..60 {
        let now = start + chrono::Duration::milliseconds(i * 500);
        let result = validator.validate_at(payload, &headers, &client_at("1.2.3.4", now), now);
        assert!(result.valid, "request {} should pass: {:?}", i + 1, result);
    }

    let now = start + chrono::Duration::seconds(45);
    let result = validator.validate_at(payload, &headers, &client_at("1.2.3.4", now), now);

    assert!(!result.valid);
    assert!(!result.details.rate_limit_ok);
    let status = result.rate_limit.expect("rate limit status");
    assert_eq!(status.limit_type, LimitType::PerMinute);
    assert_eq!(status.current_count, 60);
    assert_eq!(status.limit, 60);
    assert!(result.reason.as_ref().is_some_and(|r| r.is_retryable()));

    let last = &validator.events().recent(1)[0];
    assert_eq!(last.event_type, SecurityEventType::RateLimitExceeded);
    assert_eq!(last.severity, Severity::Medium);
    assert_eq!(last.details["limit_type"], "per_minute");
}

#[test]
fn burst_limit_plus_one_is_rejected_as_burst() {
    let burst = 5;
    let validator = WebhookValidator::new(config(60, burst)).unwrap();
    let payload = b"{}";
    let headers = signed_headers(&validator, payload);
    let start = minute_start();

    for i in 0..burst as i64 {
        let now = start + chrono::Duration::seconds(i);
        assert!(
            validator
                .validate_at(payload, &headers, &client_at("5.6.7.8", now), now)
                .valid
        );
    }
    let now = start + chrono::Duration::seconds(9);
    let result = validator.validate_at(payload, &headers, &client_at("5.6.7.8", now), now);

    assert!(!result.details.rate_limit_ok);
    let status = result.rate_limit.unwrap();
    assert_eq!(status.limit_type, LimitType::Burst);
    assert_eq!(status.current_count, burst);
    // Signature is never reached once rate limited.
    assert!(!result.details.signature_valid);
}

#[test]
fn minute_buckets_count_independently() {
    let validator = WebhookValidator::new(config(1, 100)).unwrap();
    let payload = b"{}";
    let headers = signed_headers(&validator, payload);
    let t = minute_start();
    let t_next = t + chrono::Duration::milliseconds(60_000);

    assert!(validator.validate_at(payload, &headers, &client_at("9.9.9.9", t), t).valid);
    assert!(validator.validate_at(payload, &headers, &client_at("9.9.9.9", t_next), t_next).valid);
}

#[test]
fn tampering_with_payload_or_signature_fails() {
    let validator = WebhookValidator::new(config(1_000, 1_000)).unwrap();
    let payload = br#"{"page":"strategy-plans","widget":"kpi-dashboard"}"#.to_vec();
    let headers = signed_headers(&validator, &payload);
    let client = ClientInfo::new("1.2.3.4", "ua");

    assert!(validator.validate(&payload, &headers, &client).details.signature_valid);

    let mut tampered = payload.clone();
    tampered[3] ^= 0x20;
    assert!(!validator.validate(&tampered, &headers, &client).details.signature_valid);

    let mut bad_headers = headers.clone();
    let value = bad_headers.get_mut("x-hub-signature-256").unwrap();
    let last = value.pop().unwrap();
    value.push(if last == '0' { '1' } else { '0' });
    assert!(!validator.validate(&payload, &bad_headers, &client).details.signature_valid);
}

#[test]
fn algorithm_outside_allow_list_rejected() {
    let validator = WebhookValidator::new(config(60, 10)).unwrap();
    let payload = b"{}";
    let value = validator.sign(payload, SignatureAlgorithm::Sha512).unwrap();
    let headers = HashMap::from([("x-signature".to_string(), value)]);

    let result = validator.validate(payload, &headers, &ClientInfo::new("1.2.3.4", "ua"));

    assert!(!result.valid);
    assert!(matches!(
        result.reason,
        Some(RejectReason::InvalidSignature { ref detail }) if detail.contains("sha512")
    ));
}

#[test]
fn concurrent_clients_never_exceed_budget() {
    let validator = Arc::new(WebhookValidator::new(config(50, 1_000)).unwrap());
    let payload = b"{}".to_vec();
    let headers = signed_headers(&validator, &payload);
    let now = minute_start();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let validator = validator.clone();
            let payload = payload.clone();
            let headers = headers.clone();
            thread::spawn(move || {
                (0..20)
                    .filter(|_| {
                        validator
                            .validate_at(&payload, &headers, &client_at("7.7.7.7", now), now)
                            .valid
                    })
                    .count()
            })
        })
        .collect();

    let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(accepted, 50);
}

#[tokio::test]
async fn durable_sink_receives_events() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("security-events.jsonl");
    let sink = Arc::new(JsonlEventSink::new(&path));
    let cfg = config(60, 10);
    let events =
        Arc::new(SecurityEventLog::with_sink(100, sink, Duration::from_secs(1)).unwrap());
    let rate_limits = Arc::new(hookcache_security::RateLimitStore::new(
        cfg.rate_limits.clone(),
    ));
    let validator = WebhookValidator::with_state(cfg, rate_limits, events).unwrap();

    let result = validator.validate(b"{}", &HashMap::new(), &ClientInfo::new("1.2.3.4", "ua"));
    assert!(!result.valid);

    let mut lines = 0;
    for _ in 0..100 {
        if let Ok(content) = tokio::fs::read_to_string(&path).await {
            lines = content.lines().count();
            if lines == 1 {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(lines, 1);
}
