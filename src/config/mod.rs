use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrmConfig {
    pub environment: Environment,
    pub callbacks: CallbackConfig,
    pub preload: PreloadConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Reject UPDATE/DELETE statements that carry no condition at all
    pub block_global_update: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreloadConfig {
    /// Maximum number of segments in a dotted preload path
    pub max_depth: usize,
    /// Preload every relation marked `preload` without an explicit request
    pub auto_preload: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
    pub enable_query_logging: bool,
    pub enable_slow_query_warning: bool,
    pub slow_query_threshold_ms: u64,
}

impl OrmConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("ORM_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Callback overrides
        if let Ok(v) = env::var("ORM_BLOCK_GLOBAL_UPDATE") {
            self.callbacks.block_global_update = v.parse().unwrap_or(self.callbacks.block_global_update);
        }

        // Preload overrides
        if let Ok(v) = env::var("ORM_PRELOAD_MAX_DEPTH") {
            self.preload.max_depth = v.parse().unwrap_or(self.preload.max_depth);
        }
        if let Ok(v) = env::var("ORM_AUTO_PRELOAD") {
            self.preload.auto_preload = v.parse().unwrap_or(self.preload.auto_preload);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout_secs = v.parse().unwrap_or(self.database.connection_timeout_secs);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_QUERY_LOGGING") {
            self.database.enable_query_logging = v.parse().unwrap_or(self.database.enable_query_logging);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_SLOW_QUERY_WARNING") {
            self.database.enable_slow_query_warning = v.parse().unwrap_or(self.database.enable_slow_query_warning);
        }
        if let Ok(v) = env::var("DATABASE_SLOW_QUERY_THRESHOLD_MS") {
            self.database.slow_query_threshold_ms = v.parse().unwrap_or(self.database.slow_query_threshold_ms);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            callbacks: CallbackConfig { block_global_update: false },
            preload: PreloadConfig { max_depth: 10, auto_preload: false },
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout_secs: 30,
                enable_query_logging: true,
                enable_slow_query_warning: true,
                slow_query_threshold_ms: 100,
            },
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            callbacks: CallbackConfig { block_global_update: true },
            preload: PreloadConfig { max_depth: 6, auto_preload: false },
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout_secs: 10,
                enable_query_logging: true,
                enable_slow_query_warning: true,
                slow_query_threshold_ms: 500,
            },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            callbacks: CallbackConfig { block_global_update: true },
            preload: PreloadConfig { max_depth: 4, auto_preload: false },
            database: DatabaseConfig {
                max_connections: 50,
                connection_timeout_secs: 5,
                enable_query_logging: false,
                enable_slow_query_warning: true,
                slow_query_threshold_ms: 1000,
            },
        }
    }
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self::development()
    }
}

// Global config - initialized once at startup
pub static CONFIG: Lazy<OrmConfig> = Lazy::new(OrmConfig::from_env);

pub fn config() -> &'static OrmConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = OrmConfig::development();
        assert!(!config.callbacks.block_global_update);
        assert_eq!(config.preload.max_depth, 10);
        assert!(config.database.enable_query_logging);
    }

    #[test]
    fn test_default_production_config() {
        let config = OrmConfig::production();
        assert!(config.callbacks.block_global_update);
        assert_eq!(config.preload.max_depth, 4);
        assert!(!config.database.enable_query_logging);
    }
}
