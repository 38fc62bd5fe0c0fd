//! Configuration loader
//!
//! Loads service configuration from environment variables with sensible
//! defaults, honouring a local `.env` file when present.
//!
//! ## Environment Variables
//! - `FEATUREGATE_DB_PATH`: Database file path (default `featuregate.db`)
//! - `FEATUREGATE_DB_POOL_SIZE`: Connection pool size (default `4`)
//! - `FEATUREGATE_CACHE_TTL_SECS`: Flag cache TTL in seconds (default `300`)

use std::time::Duration;

use featuregate_domain::constants::FLAG_CACHE_TTL;
use featuregate_domain::{FeatureGateError, Result};
use serde::{Deserialize, Serialize};

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureGateConfig {
    pub database: DatabaseConfig,
    pub cache_ttl_secs: u64,
}

impl Default for FeatureGateConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig { path: "featuregate.db".to_string(), pool_size: 4 },
            cache_ttl_secs: FLAG_CACHE_TTL.as_secs(),
        }
    }
}

impl FeatureGateConfig {
    /// Flag cache TTL as a `Duration`.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Load configuration from the environment.
///
/// Missing variables fall back to defaults; present-but-invalid values are
/// configuration errors.
pub fn load() -> Result<FeatureGateConfig> {
    dotenvy::dotenv().ok();
    let config = from_lookup(|key| std::env::var(key).ok())?;
    tracing::info!(
        db_path = %config.database.path,
        pool_size = config.database.pool_size,
        cache_ttl_secs = config.cache_ttl_secs,
        "configuration loaded"
    );
    Ok(config)
}

fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<FeatureGateConfig> {
    let mut config = FeatureGateConfig::default();

    if let Some(path) = lookup("FEATUREGATE_DB_PATH") {
        config.database.path = path;
    }
    if let Some(size) = lookup("FEATUREGATE_DB_POOL_SIZE") {
        config.database.pool_size = size
            .parse()
            .map_err(|e| FeatureGateError::Config(format!("Invalid pool size: {e}")))?;
    }
    if let Some(ttl) = lookup("FEATUREGATE_CACHE_TTL_SECS") {
        config.cache_ttl_secs = ttl
            .parse()
            .map_err(|e| FeatureGateError::Config(format!("Invalid cache TTL: {e}")))?;
    }

    Ok(config)
}
