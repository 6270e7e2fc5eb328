//! Security configuration.
//!
//! Loaded once at service start, either from the environment or from the
//! `security` section of a YAML document, and immutable afterwards.
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `HOOKCACHE_WEBHOOK_SECRET` | HMAC secret shared with the workflow platform |
//! | `HOOKCACHE_RATE_PER_MINUTE` | Requests per client per minute (default: 60) |
//! | `HOOKCACHE_RATE_PER_HOUR` | Requests per client per hour (default: 1000) |
//! | `HOOKCACHE_BURST_LIMIT` | Requests per client per burst window (default: 10) |
//! | `HOOKCACHE_BURST_WINDOW_SECS` | Burst window length (default: 10) |
//! | `HOOKCACHE_ALLOWED_SOURCES` | Comma-separated IPs/CIDRs, `*` for any (default: `*`) |
//! | `HOOKCACHE_SIGNATURE_ALGORITHMS` | Comma-separated HMAC algorithms (default: `sha256`) |
//! | `HOOKCACHE_MAX_PAYLOAD_BYTES` | Maximum webhook body size (default: 1 MiB) |
//! | `HOOKCACHE_TIMESTAMP_TOLERANCE_SECS` | Replay window (default: 300) |

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SecurityError, SecurityResult};
use crate::signature::SignatureAlgorithm;
use crate::source::SourcePolicy;

/// Largest window, in seconds, whose millisecond length fits an `i64`.
pub const MAX_WINDOW_SECS: u64 = (i64::MAX / 1000) as u64;

/// Rate-limit thresholds applied per client identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per minute bucket.
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,

    /// Requests allowed per hour bucket.
    #[serde(default = "default_per_hour")]
    pub per_hour: u32,

    /// Requests allowed per burst window.
    #[serde(default = "default_burst_limit")]
    pub burst_limit: u32,

    /// Burst window length in seconds.
    #[serde(default = "default_burst_window_secs")]
    pub burst_window_secs: u64,
}

impl RateLimitConfig {
    pub fn burst_window(&self) -> Duration {
        Duration::from_secs(self.burst_window_secs)
    }

    /// Burst window in milliseconds, saturating at `i64::MAX`.
    pub fn burst_window_ms(&self) -> i64 {
        secs_to_ms(self.burst_window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
            per_hour: default_per_hour(),
            burst_limit: default_burst_limit(),
            burst_window_secs: default_burst_window_secs(),
        }
    }
}

/// Process-wide security configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// HMAC secret.
    #[serde(default)]
    pub hmac_secret: String,

    /// Rate-limit thresholds.
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Allowed sources: exact IPs, CIDR networks, or `*`.
    #[serde(default = "default_allowed_sources")]
    pub allowed_sources: Vec<String>,

    /// Accepted signature algorithms (`sha256`, `sha384`, `sha512`).
    #[serde(default = "default_signature_algorithms")]
    pub signature_algorithms: Vec<String>,

    /// Maximum accepted payload size in bytes.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Maximum distance between the delivery timestamp and now.
    #[serde(default = "default_timestamp_tolerance_secs")]
    pub timestamp_tolerance_secs: u64,

    /// Number of security events kept in memory.
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,
}

fn default_per_minute() -> u32 {
    60
}

fn default_per_hour() -> u32 {
    1000
}

fn default_burst_limit() -> u32 {
    10
}

fn default_burst_window_secs() -> u64 {
    10
}

fn default_allowed_sources() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_signature_algorithms() -> Vec<String> {
    vec!["sha256".to_string()]
}

fn default_max_payload_bytes() -> usize {
    1024 * 1024
}

fn default_timestamp_tolerance_secs() -> u64 {
    300
}

fn default_event_log_capacity() -> usize {
    1000
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            hmac_secret: String::new(),
            rate_limits: RateLimitConfig::default(),
            allowed_sources: default_allowed_sources(),
            signature_algorithms: default_signature_algorithms(),
            max_payload_bytes: default_max_payload_bytes(),
            timestamp_tolerance_secs: default_timestamp_tolerance_secs(),
            event_log_capacity: default_event_log_capacity(),
        }
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("hmac_secret", &"<redacted>")
            .field("rate_limits", &self.rate_limits)
            .field("allowed_sources", &self.allowed_sources)
            .field("signature_algorithms", &self.signature_algorithms)
            .field("max_payload_bytes", &self.max_payload_bytes)
            .field("timestamp_tolerance_secs", &self.timestamp_tolerance_secs)
            .field("event_log_capacity", &self.event_log_capacity)
            .finish()
    }
}

impl SecurityConfig {
    /// Create a config with the given secret and defaults for everything else.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            hmac_secret: secret.into(),
            ..Self::default()
        }
    }

    /// Create config from environment variables.
    ///
    /// Unset or unparseable variables fall back to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("HOOKCACHE_WEBHOOK_SECRET") {
            cfg.hmac_secret = v;
        }
        if let Some(v) = env_parse("HOOKCACHE_RATE_PER_MINUTE") {
            cfg.rate_limits.per_minute = v;
        }
        if let Some(v) = env_parse("HOOKCACHE_RATE_PER_HOUR") {
            cfg.rate_limits.per_hour = v;
        }
        if let Some(v) = env_parse("HOOKCACHE_BURST_LIMIT") {
            cfg.rate_limits.burst_limit = v;
        }
        if let Some(v) = env_parse("HOOKCACHE_BURST_WINDOW_SECS") {
            cfg.rate_limits.burst_window_secs = v;
        }
        if let Ok(v) = std::env::var("HOOKCACHE_ALLOWED_SOURCES") {
            cfg.allowed_sources = split_list(&v);
        }
        if let Ok(v) = std::env::var("HOOKCACHE_SIGNATURE_ALGORITHMS") {
            cfg.signature_algorithms = split_list(&v)
                .into_iter()
                .map(|a| a.to_ascii_lowercase())
                .collect();
        }
        if let Some(v) = env_parse("HOOKCACHE_MAX_PAYLOAD_BYTES") {
            cfg.max_payload_bytes = v;
        }
        if let Some(v) = env_parse("HOOKCACHE_TIMESTAMP_TOLERANCE_SECS") {
            cfg.timestamp_tolerance_secs = v;
        }

        cfg
    }

    /// Parse from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> SecurityResult<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| SecurityError::config(format!("invalid security config: {}", e)))
    }

    /// Load from a YAML file.
    pub fn load(path: &Path) -> SecurityResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SecurityError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Check the configuration is usable by a validator.
    pub fn validate(&self) -> SecurityResult<()> {
        if self.hmac_secret.is_empty() {
            return Err(SecurityError::config("hmac_secret must not be empty"));
        }
        let limits = &self.rate_limits;
        if limits.per_minute == 0 || limits.per_hour == 0 || limits.burst_limit == 0 {
            return Err(SecurityError::config("rate limits must be greater than zero"));
        }
        if limits.burst_window_secs == 0 {
            return Err(SecurityError::config(
                "burst_window_secs must be greater than zero",
            ));
        }
        if limits.burst_window_secs > MAX_WINDOW_SECS {
            return Err(SecurityError::config(format!(
                "burst_window_secs must not exceed {}",
                MAX_WINDOW_SECS
            )));
        }
        if self.timestamp_tolerance_secs > MAX_WINDOW_SECS {
            return Err(SecurityError::config(format!(
                "timestamp_tolerance_secs must not exceed {}",
                MAX_WINDOW_SECS
            )));
        }
        if self.max_payload_bytes == 0 {
            return Err(SecurityError::config(
                "max_payload_bytes must be greater than zero",
            ));
        }
        if self.signature_algorithms.is_empty() {
            return Err(SecurityError::config(
                "at least one signature algorithm is required",
            ));
        }
        for name in &self.signature_algorithms {
            if SignatureAlgorithm::parse(name).is_none() {
                return Err(SecurityError::config(format!(
                    "unsupported signature algorithm: {}",
                    name
                )));
            }
        }
        SourcePolicy::parse(&self.allowed_sources)?;
        Ok(())
    }

    /// Replay window.
    pub fn timestamp_tolerance(&self) -> Duration {
        Duration::from_secs(self.timestamp_tolerance_secs)
    }

    /// Replay window in milliseconds, saturating at `i64::MAX`.
    pub fn timestamp_tolerance_ms(&self) -> i64 {
        secs_to_ms(self.timestamp_tolerance_secs)
    }

    /// Copy with the secret replaced, for display.
    pub fn redacted(&self) -> Self {
        Self {
            hmac_secret: if self.hmac_secret.is_empty() {
                String::new()
            } else {
                "<redacted>".to_string()
            },
            ..self.clone()
        }
    }
}

pub(crate) fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1000)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
