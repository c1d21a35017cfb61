//! TOML-based application configuration.
//!
//! Stores the accrual bounds, tick cadence, ledger retention and the
//! marker insertion/auto-stop policies.
//!
//! Configuration is stored at `~/.config/tickmark/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::document::InsertPosition;
use crate::error::ConfigError;
use crate::timer::AccrualConfig;

/// What to do when a ticking marker becomes permanently unresolvable in
/// its document (treated as an implicit delete).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoStopPolicy {
    /// Drop the unflushed increment.
    Discard,
    /// Best-effort final flush using the last known context.
    #[default]
    FlushFinal,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/tickmark/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub accrual: AccrualConfig,
    #[serde(default = "default_tick_period_secs")]
    pub tick_period_secs: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default)]
    pub insert_position: InsertPosition,
    #[serde(default)]
    pub auto_stop: AutoStopPolicy,
    #[serde(default = "default_ledger_file")]
    pub ledger_file: String,
}

fn default_tick_period_secs() -> u64 {
    1
}

fn default_retention_days() -> i64 {
    365
}

fn default_ledger_file() -> String {
    "tickmark-ledger.json".to_string()
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            accrual: AccrualConfig::default(),
            tick_period_secs: default_tick_period_secs(),
            retention_days: default_retention_days(),
            insert_position: InsertPosition::default(),
            auto_stop: AutoStopPolicy::default(),
            ledger_file: default_ledger_file(),
        }
    }
}

/// Returns `~/.config/tickmark[-dev]/` based on TICKMARK_ENV.
///
/// Set TICKMARK_ENV=dev to use a development data directory.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("TICKMARK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("tickmark-dev")
    } else {
        base_dir.join("tickmark")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

impl TrackerConfig {
    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|err| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/tickmark"),
            message: err.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk or write and return the default.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|err| ConfigError::LoadFailed {
                path,
                message: err.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|err| ConfigError::SaveFailed {
            path: path.clone(),
            message: err.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|err| ConfigError::SaveFailed {
            path,
            message: err.to_string(),
        })
    }

    /// Load from disk, returning default on error. Never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        match current {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key and persist.
    ///
    /// # Errors
    /// Returns an error if the key is unknown, the value does not fit the
    /// field's type, or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json =
            serde_json::to_value(&*self).map_err(|err| invalid(err.to_string()))?;

        let mut current = &mut json;
        let mut parts = key.split('.').peekable();
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let slot = current
                    .get_mut(part)
                    .ok_or_else(|| invalid("unknown config key".to_string()))?;
                let coerced = coerce(slot, value).map_err(invalid)?;
                *slot = coerced;
            } else {
                current = current
                    .get_mut(part)
                    .ok_or_else(|| invalid("unknown config key".to_string()))?;
            }
        }

        *self = serde_json::from_value(json).map_err(|err| invalid(err.to_string()))?;
        self.save()
    }
}

/// Parse `value` with the same JSON type as the existing field.
fn coerce(existing: &serde_json::Value, value: &str) -> Result<serde_json::Value, String> {
    match existing {
        serde_json::Value::Bool(_) => value
            .parse::<bool>()
            .map(serde_json::Value::Bool)
            .map_err(|err| err.to_string()),
        serde_json::Value::Number(_) => value
            .parse::<i64>()
            .map(|n| serde_json::Value::Number(n.into()))
            .map_err(|err| err.to_string()),
        _ => Ok(serde_json::Value::String(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrips_through_toml() {
        let cfg = TrackerConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: TrackerConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.accrual.sleep_gap_secs, 60);
        assert_eq!(parsed.accrual.max_step_secs, 5);
        assert_eq!(parsed.retention_days, 365);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: TrackerConfig = toml::from_str(
            r#"
            retention_days = 30

            [accrual]
            sleep_gap_secs = 120
            "#,
        )
        .unwrap();
        assert_eq!(parsed.retention_days, 30);
        assert_eq!(parsed.accrual.sleep_gap_secs, 120);
        assert_eq!(parsed.accrual.max_step_secs, 5);
        assert_eq!(parsed.insert_position, InsertPosition::LineEnd);
        assert_eq!(parsed.auto_stop, AutoStopPolicy::FlushFinal);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = TrackerConfig::default();
        assert_eq!(cfg.get("accrual.sleep_gap_secs").as_deref(), Some("60"));
        assert_eq!(cfg.get("tick_period_secs").as_deref(), Some("1"));
        assert_eq!(cfg.get("insert_position").as_deref(), Some("line-end"));
        assert!(cfg.get("accrual.missing").is_none());
    }

    #[test]
    fn policies_serialize_as_kebab_case() {
        let json = serde_json::to_value(AutoStopPolicy::FlushFinal).unwrap();
        assert_eq!(json, "flush-final");
        let json = serde_json::to_value(InsertPosition::LineStart).unwrap();
        assert_eq!(json, "line-start");
    }
}
