//! Coordinator and warming configuration.
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `HOOKCACHE_CALL_TIMEOUT_MS` | Bound on every collaborator call (default: 5000) |
//! | `HOOKCACHE_WARMING_BATCH_SIZE` | Pages warmed concurrently per batch (default: 3) |
//! | `HOOKCACHE_WARMING_BATCH_DELAY_MS` | Pause between warming batches (default: 100) |
//! | `HOOKCACHE_MAX_DEPENDENCY_DEPTH` | Depth limit for dependency-chain warming (default: 3) |
//! | `HOOKCACHE_CATALOG_PATH` | YAML page catalog replacing the built-in one |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::PageCatalog;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    #[serde(default = "default_warming_batch_size")]
    pub warming_batch_size: usize,

    #[serde(default = "default_warming_batch_delay_ms")]
    pub warming_batch_delay_ms: u64,

    #[serde(default = "default_max_dependency_depth")]
    pub max_dependency_depth: u32,

    #[serde(default = "PageCatalog::builtin")]
    pub catalog: PageCatalog,
}

fn default_call_timeout_ms() -> u64 {
    5000
}

fn default_warming_batch_size() -> usize {
    3
}

fn default_warming_batch_delay_ms() -> u64 {
    100
}

fn default_max_dependency_depth() -> u32 {
    3
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            warming_batch_size: default_warming_batch_size(),
            warming_batch_delay_ms: default_warming_batch_delay_ms(),
            max_dependency_depth: default_max_dependency_depth(),
            catalog: PageCatalog::builtin(),
        }
    }
}

impl CoordinatorConfig {
    /// Defaults with a different catalog.
    pub fn with_catalog(catalog: PageCatalog) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    /// Create config from environment variables.
    ///
    /// Unparseable numbers fall back to defaults; an unreadable catalog file
    /// is an error.
    pub fn from_env() -> CoreResult<Self> {
        let mut cfg = Self::default();

        if let Some(v) = env_parse("HOOKCACHE_CALL_TIMEOUT_MS") {
            cfg.call_timeout_ms = v;
        }
        if let Some(v) = env_parse("HOOKCACHE_WARMING_BATCH_SIZE") {
            cfg.warming_batch_size = v;
        }
        if let Some(v) = env_parse("HOOKCACHE_WARMING_BATCH_DELAY_MS") {
            cfg.warming_batch_delay_ms = v;
        }
        if let Some(v) = env_parse("HOOKCACHE_MAX_DEPENDENCY_DEPTH") {
            cfg.max_dependency_depth = v;
        }
        if let Ok(path) = std::env::var("HOOKCACHE_CATALOG_PATH") {
            cfg.catalog = PageCatalog::load(Path::new(&path))?;
        }

        Ok(cfg)
    }

    pub fn from_yaml_str(yaml: &str) -> CoreResult<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| CoreError::config(format!("invalid coordinator config: {}", e)))
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.call_timeout_ms == 0 {
            return Err(CoreError::config("call_timeout_ms must be greater than zero"));
        }
        if self.warming_batch_size == 0 {
            return Err(CoreError::config(
                "warming_batch_size must be greater than zero",
            ));
        }
        self.catalog.validate()
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn warming_batch_delay(&self) -> Duration {
        Duration::from_millis(self.warming_batch_delay_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
