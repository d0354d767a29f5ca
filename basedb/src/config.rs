use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runtime configuration for a store and the processes that serve it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory holding one subdirectory per database
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("data"),
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Config {
    /// Config with defaults for everything but the data directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Config {
            data_dir: data_dir.into(),
            ..Config::default()
        }
    }

    /// Parse a YAML config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Build the config from the process environment: the file named by
    /// `BASEDB_CONFIG` (if set), then `BASEDB_DATA_DIR`, `BASEDB_HOST` and
    /// `BASEDB_PORT` overrides.
    pub fn from_env() -> Result<Self> {
        let base = match std::env::var("BASEDB_CONFIG") {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => Config::default(),
        };
        Ok(base.with_overrides(|key| std::env::var(key).ok()))
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("BASEDB_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(host) = lookup("BASEDB_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("BASEDB_PORT") {
            match port.parse() {
                Ok(p) => self.port = p,
                Err(_) => log::warn!("Ignoring invalid BASEDB_PORT value '{port}'"),
            }
        }
        self
    }
}
