//! Service configuration.
//!
//! Loaded from the YAML file named by `DEFRAG_CONFIG` when set, then
//! overridden field by field from the environment:
//!
//! | Variable                  | Field               |
//! |---------------------------|---------------------|
//! | `PORT`                    | `port`              |
//! | `DEFRAG_REGISTRY`         | `registry_path`     |
//! | `DEFRAG_REGIMES`          | `regimes_path`      |
//! | `DEFRAG_TONE`             | `tone_path`         |
//! | `GEMINI_MODEL`            | `gemini_model`      |
//! | `DEFRAG_MODEL_TIMEOUT_MS` | `model_timeout_ms`  |
//!
//! Tables without a path fall back to their built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::{CapabilityRegistry, RegistryError};
use crate::policy::{PolicyError, RegimeTable, ToneConfig, ToneGate};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MODEL_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SESSION_SWEEP_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    pub registry_path: Option<PathBuf>,
    pub regimes_path: Option<PathBuf>,
    pub tone_path: Option<PathBuf>,
    /// Gemini model name; the client's default when unset.
    pub gemini_model: Option<String>,
    pub model_timeout_ms: u64,
    /// Smoothed dispatch latency above which the system reports
    /// HIGH_LATENCY. No latency tracking when unset.
    pub latency_threshold_ms: Option<u64>,
    /// Interval of the expired-session sweep; 0 disables it.
    pub session_sweep_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            registry_path: None,
            regimes_path: None,
            tone_path: None,
            gemini_model: None,
            model_timeout_ms: DEFAULT_MODEL_TIMEOUT_MS,
            latency_threshold_ms: None,
            session_sweep_secs: DEFAULT_SESSION_SWEEP_SECS,
        }
    }
}

impl AppConfig {
    /// File (if `DEFRAG_CONFIG` is set) plus process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("DEFRAG_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_file(Path::new(&path))?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Apply overrides from `lookup` (normally the environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(port) = get("PORT") {
            self.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key: "PORT", value: port })?;
        }
        if let Some(path) = get("DEFRAG_REGISTRY") {
            self.registry_path = Some(PathBuf::from(path));
        }
        if let Some(path) = get("DEFRAG_REGIMES") {
            self.regimes_path = Some(PathBuf::from(path));
        }
        if let Some(path) = get("DEFRAG_TONE") {
            self.tone_path = Some(PathBuf::from(path));
        }
        if let Some(model) = get("GEMINI_MODEL") {
            self.gemini_model = Some(model);
        }
        if let Some(ms) = get("DEFRAG_MODEL_TIMEOUT_MS") {
            self.model_timeout_ms = ms.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "DEFRAG_MODEL_TIMEOUT_MS",
                value: ms,
            })?;
        }
        Ok(())
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    pub fn registry(&self) -> Result<CapabilityRegistry, ConfigError> {
        match &self.registry_path {
            Some(path) => Ok(CapabilityRegistry::from_file(path)?),
            None => Ok(CapabilityRegistry::builtin()),
        }
    }

    pub fn regime_table(&self) -> Result<RegimeTable, ConfigError> {
        match &self.regimes_path {
            Some(path) => Ok(RegimeTable::from_file(path)?),
            None => Ok(RegimeTable::default()),
        }
    }

    pub fn tone_gate(&self) -> Result<ToneGate, ConfigError> {
        let table = match &self.tone_path {
            Some(path) => ToneConfig::from_file(path)?,
            None => ToneConfig::default(),
        };
        Ok(ToneGate::new(&table)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.model_timeout(), Duration::from_secs(30));
        assert_eq!(config.registry().unwrap().len(), 4);
        assert!(config.regime_table().unwrap().get(crate::policy::Regime::Hold).is_some());
        assert!(config.tone_gate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env(&[
                ("PORT", "9090"),
                ("GEMINI_MODEL", "gemini-1.5-pro"),
                ("DEFRAG_MODEL_TIMEOUT_MS", "1500"),
                ("DEFRAG_TONE", ""),
            ]))
            .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.gemini_model.as_deref(), Some("gemini-1.5-pro"));
        assert_eq!(config.model_timeout_ms, 1500);
        assert!(config.tone_path.is_none());
        assert_eq!(config.bind_addr(), "0.0.0.0:9090");
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = AppConfig::default();
        let err = config.apply_overrides(env(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { key: "PORT", .. }));
    }

    #[test]
    fn test_file_then_tables() {
        let dir = tempfile::tempdir().unwrap();
        let registry = dir.path().join("agents.yaml");
        std::fs::write(
            &registry,
            "agentRegistryVersion: '1.0.0'\nagents:\n  - name: echo\n    domain: test\n",
        )
        .unwrap();
        let config_path = dir.path().join("defrag.yaml");
        std::fs::write(
            &config_path,
            format!("port: 7000\nregistry_path: {}\nlatency_threshold_ms: 250\n", registry.display()),
        )
        .unwrap();

        let config = AppConfig::from_file(&config_path).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.latency_threshold_ms, Some(250));
        assert_eq!(config.session_sweep_secs, DEFAULT_SESSION_SWEEP_SECS);
        let reg = config.registry().unwrap();
        assert!(reg.contains("echo"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_missing_table_file_is_an_error() {
        let config = AppConfig {
            regimes_path: Some(PathBuf::from("/nonexistent/regimes.yaml")),
            ..AppConfig::default()
        };
        assert!(matches!(config.regime_table(), Err(ConfigError::Policy(_))));
    }
}
