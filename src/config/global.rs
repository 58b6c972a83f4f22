//! Global configuration.
//!
//! Loaded from ~/.config/flowloop/flowloop.yml or .flowloop.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global configuration for flowloop.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Loop engine tuning.
    pub engine: EngineConfig,

    /// Loop settings applied when a flow leaves them unset.
    #[serde(rename = "loop-defaults")]
    pub loop_defaults: Map<String, Value>,
}

impl GlobalConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .flowloop.yml in current directory
    /// 3. ~/.config/flowloop/flowloop.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(".flowloop.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .flowloop.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .flowloop.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("flowloop").join("flowloop.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.engine.heartbeat_interval_ms == 0 {
            eyre::bail!("engine.heartbeat-interval-ms must be > 0");
        }
        if self.engine.condition_history == 0 {
            eyre::bail!("engine.condition-history must be > 0");
        }
        Ok(())
    }

    /// Fill keys missing from `settings` with the configured loop defaults.
    pub fn settings_with_defaults(&self, settings: &Value) -> Value {
        let mut merged = self.loop_defaults.clone();
        if let Value::Object(map) = settings {
            for (key, value) in map {
                merged.insert(key.clone(), value.clone());
            }
        }
        Value::Object(merged)
    }
}

/// Loop engine tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum time between "still running" heartbeats.
    #[serde(rename = "heartbeat-interval-ms")]
    pub heartbeat_interval_ms: u64,

    /// Total run time after which each heartbeat also warns.
    #[serde(rename = "slow-loop-warning-ms")]
    pub slow_loop_warning_ms: u64,

    /// Condition snapshots kept for infinite-loop detection.
    #[serde(rename = "condition-history")]
    pub condition_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 5_000,
            slow_loop_warning_ms: 30_000,
            condition_history: 10,
        }
    }
}

impl EngineConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn slow_loop_warning(&self) -> Duration {
        Duration::from_millis(self.slow_loop_warning_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = GlobalConfig::default();
        assert_eq!(config.engine.heartbeat_interval_ms, 5_000);
        assert_eq!(config.engine.slow_loop_warning_ms, 30_000);
        assert_eq!(config.engine.condition_history, 10);
        assert!(config.loop_defaults.is_empty());
    }

    #[test]
    fn test_config_validation() {
        assert!(GlobalConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = GlobalConfig {
            engine: EngineConfig {
                heartbeat_interval_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
engine:
  heartbeat-interval-ms: 1000
loop-defaults:
  maxIterations: 200
"#;
        let config: GlobalConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.engine.heartbeat_interval_ms, 1000);
        // Other fields should have defaults
        assert_eq!(config.engine.condition_history, 10);
        assert_eq!(config.loop_defaults["maxIterations"], 200);
    }

    #[test]
    fn test_settings_with_defaults() {
        let yaml = "loop-defaults:\n  maxIterations: 200\n  delay: 5\n";
        let config: GlobalConfig = serde_yaml::from_str(yaml).unwrap();
        let merged = config.settings_with_defaults(&json!({"loopType": "count", "delay": 0}));
        assert_eq!(merged["maxIterations"], 200);
        assert_eq!(merged["delay"], 0);
        assert_eq!(merged["loopType"], "count");
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flowloop.yml");
        fs::write(&path, "engine:\n  slow-loop-warning-ms: 60000\n").unwrap();
        let config = GlobalConfig::load(Some(&path)).unwrap();
        assert_eq!(config.engine.slow_loop_warning(), Duration::from_secs(60));
    }

    #[test]
    fn test_load_explicit_path_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.yml");
        assert!(GlobalConfig::load(Some(&path)).is_err());
    }
}
