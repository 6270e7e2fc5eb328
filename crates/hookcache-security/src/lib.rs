//! Security validation for inbound workflow-platform webhooks.
//!
//! This crate decides whether a webhook delivery may drive cache work:
//!
//! - Payload size and replay-window checks
//! - Burst / per-minute / per-hour rate limiting per client
//! - Source allow-list with CIDR support
//! - HMAC signature verification with constant-time comparison
//! - Bounded security event log with an optional durable sink
//!
//! # Quick Start
//!
//! ```no_run
//! use std::collections::HashMap;
//! use hookcache_security::{ClientInfo, SecurityConfig, WebhookValidator};
//!
//! # fn example() -> Result<(), hookcache_security::SecurityError> {
//! let validator = WebhookValidator::new(SecurityConfig::from_env())?;
//!
//! let payload = br#"{"workflow_id":"wf-42"}"#;
//! let headers = HashMap::from([(
//!     "x-hub-signature-256".to_string(),
//!     "sha256=...".to_string(),
//! )]);
//! let result = validator.validate(payload, &headers, &ClientInfo::new("1.2.3.4", "opal/1.0"));
//! if !result.valid {
//!     println!("rejected: {:?}", result.reason);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod rate_limit;
pub mod signature;
pub mod sink;
pub mod source;
pub mod types;
pub mod validator;

pub use config::{RateLimitConfig, SecurityConfig, MAX_WINDOW_SECS};
pub use error::{SecurityError, SecurityResult};
pub use events::{
    SecurityEvent, SecurityEventLog, SecurityEventSummary, SecurityEventType, Severity,
    DEFAULT_SINK_QUEUE, DEFAULT_SINK_TIMEOUT,
};
pub use rate_limit::{LimitType, RateDecision, RateLimitStatus, RateLimitStore};
pub use signature::{sign, verify_signature, SignatureAlgorithm, SignatureError, SIGNATURE_HEADERS};
pub use sink::{EventSink, JsonlEventSink};
pub use source::{client_key, SourcePolicy};
pub use types::{CheckDetails, ClientInfo, RejectReason, ValidationResult};
pub use validator::WebhookValidator;
