//! Combined configuration file.
//!
//! ```yaml
//! security:
//!   hmac_secret: ...
//!   allowed_sources: ["10.0.0.0/8"]
//! coordinator:
//!   call_timeout_ms: 2000
//! ```
//!
//! Without a file both sections come from the environment. A file without a
//! secret takes `HOOKCACHE_WEBHOOK_SECRET`, so secrets need not be committed.

use anyhow::{Context, Result};
use hookcache_core::CoordinatorConfig;
use hookcache_security::SecurityConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config: {}", path.display()))?;
                Self::from_yaml_str(&content)
                    .with_context(|| format!("invalid config: {}", path.display()))?
            }
            None => Self {
                security: SecurityConfig::from_env(),
                coordinator: CoordinatorConfig::from_env()?,
            },
        };

        if settings.security.hmac_secret.is_empty() {
            if let Ok(secret) = std::env::var("HOOKCACHE_WEBHOOK_SECRET") {
                settings.security.hmac_secret = secret;
            }
        }
        Ok(settings)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Copy safe to print.
    pub fn redacted(&self) -> Self {
        Self {
            security: self.security.redacted(),
            coordinator: self.coordinator.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_default_independently() {
        let settings = Settings::from_yaml_str(
            r#"
security:
  hmac_secret: file-secret
  rate_limits:
    per_minute: 30
"#,
        )
        .unwrap();
        assert_eq!(settings.security.rate_limits.per_minute, 30);
        assert_eq!(settings.coordinator.call_timeout_ms, 5000);
        assert!(settings.coordinator.catalog.contains_page("strategy-plans"));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hookcache.yaml");
        std::fs::write(
            &path,
            "security:\n  hmac_secret: from-file\ncoordinator:\n  warming_batch_size: 5\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.security.hmac_secret, "from-file");
        assert_eq!(settings.coordinator.warming_batch_size, 5);
        assert_eq!(settings.redacted().security.hmac_secret, "<redacted>");
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = Settings::load(Some(Path::new("/nonexistent/hookcache.yaml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
