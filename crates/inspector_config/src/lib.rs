use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use tracing::debug;

use crate::{logger::LoggerConfig, target::TargetConfig};

pub(crate) mod defaults;
pub mod logger;
pub mod target;

pub use defaults::DEFAULT_PORT;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing)]
    path: Option<Utf8PathBuf>,

    /// Listening port. Negative disables the network listener, 0 picks an
    /// ephemeral port.
    #[serde(default = "defaults::default_port")]
    pub port: i32,

    /// Interface the listener binds to
    #[serde(default = "defaults::default_host")]
    pub host: String,

    /// Context group the bridge attaches to
    #[serde(default = "defaults::default_context_group_id")]
    pub context_group_id: i32,

    /// Human readable name of the debugged context
    #[serde(default = "defaults::default_context_name")]
    pub context_name: String,

    /// Target metadata served from the discovery endpoint
    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub logger: LoggerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: None,
            port: defaults::default_port(),
            host: defaults::default_host(),
            context_group_id: defaults::default_context_group_id(),
            context_name: defaults::default_context_name(),
            target: TargetConfig::default(),
            logger: LoggerConfig::default(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn with_path(mut self, path: &Utf8PathBuf) -> Self {
        self.path = Some(path.clone());
        self
    }

    pub fn path(&self) -> Utf8PathBuf {
        self.path.clone().unwrap_or(Self::default_path())
    }

    /// Loads config from a json file
    ///
    /// # Errors
    ///
    /// Fails if the file does not exist or is not a valid config
    pub fn load(path: &Utf8PathBuf) -> Result<Self> {
        debug!("Loading config from {path}");

        if !path.exists() {
            anyhow::bail!("Config file does not exist: {path}");
        }

        let contents =
            fs::read_to_string(path).context(format!("Failed reading config: {path}"))?;

        let mut cfg: Self =
            serde_json::from_str(&contents).context(format!("Failed parsing config: {path}"))?;
        cfg.path = Some(path.clone());

        Ok(cfg)
    }

    /// Loads the config at `path`, or the defaults (bound to `path`) when no
    /// file exists there yet.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed
    pub fn load_or_default(path: &Utf8PathBuf) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No config at {path}, using defaults");
            Ok(Self::default().with_path(path))
        }
    }

    /// Saves config as pretty json to its path
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written
    pub fn save(&self) -> Result<()> {
        let dest = self.path();
        debug!("Saving config to {dest}");
        let contents = serde_json::to_string_pretty(self).unwrap_or(json!(self).to_string());

        fs::write(&dest, contents).context(format!("Failed writing config: {dest}"))?;

        Ok(())
    }

    /// Default config path is ./inspector.json
    pub fn default_path() -> Utf8PathBuf {
        Utf8PathBuf::new().join("inspector.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::LogLevel;

    fn temp_path(dir: &tempfile::TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.port, 9229);
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.context_group_id, 1);
        assert_eq!(cfg.target.target_type, "node");
        assert_eq!(cfg.target.browser, "Puerts/v1.0.0");
        assert_eq!(cfg.target.protocol_version, "1.1");
        assert_eq!(cfg.path(), Config::default_path());
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.port, 9229);
        assert_eq!(cfg.target, TargetConfig::default());
        assert!(cfg.logger.enabled);
    }

    #[test]
    fn test_partial_target_keeps_other_defaults() {
        let cfg: Config =
            serde_json::from_str(r#"{"port": 9333, "target": {"title": "game", "type": "page"}}"#)
                .unwrap();
        assert_eq!(cfg.port, 9333);
        assert_eq!(cfg.target.title, "game");
        assert_eq!(cfg.target.target_type, "page");
        assert_eq!(cfg.target.id, "0");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "inspector.json");

        let mut cfg = Config::default().with_path(&path);
        cfg.port = -1;
        cfg.logger.level = LogLevel::Debug;
        cfg.save().unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.port, -1);
        assert_eq!(loaded.logger.level, LogLevel::Debug);
        assert_eq!(loaded.path(), path);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "missing.json");

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_load_or_default_binds_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "fresh.json");

        let cfg = Config::load_or_default(&path).unwrap();
        assert_eq!(cfg.port, 9229);
        assert_eq!(cfg.path(), path);
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed parsing config"));
    }
}
