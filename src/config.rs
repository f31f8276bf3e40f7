use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, ReviewError};
use crate::reschedule::IntervalBaseline;

const APP_NAME: &str = "recall";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where reviews are stored. Defaults to `reviews.json` in the data dir.
    #[serde(default)]
    pub data_file: Option<PathBuf>,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agenda: AgendaConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub interval_baseline: IntervalBaseline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgendaConfig {
    #[serde(default = "default_days_ahead")]
    pub days_ahead: i64,
}

fn default_port() -> u16 {
    3000
}

fn default_days_ahead() -> i64 {
    7
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for AgendaConfig {
    fn default() -> Self {
        Self {
            days_ahead: default_days_ahead(),
        }
    }
}

impl Config {
    /// Loads `explicit` if given (it must exist), otherwise the user config
    /// file if present, otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ReviewError::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|p| p.config_dir().join("config.toml"))
    }

    pub fn data_file(&self) -> Result<PathBuf> {
        if let Some(path) = &self.data_file {
            return Ok(path.clone());
        }
        ProjectDirs::from("", "", APP_NAME)
            .map(|p| p.data_dir().join("reviews.json"))
            .ok_or_else(|| ReviewError::Config("could not find a data directory".into()))
    }
}
