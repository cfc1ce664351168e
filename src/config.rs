//! Pipeline configuration (§6 recognized options) and on-disk settings:
//! a `dirs`-resolved config/data directory and a TOML load/save idiom.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine home directory")]
    NoHomeDir,
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Quick,
    Full,
}

/// The §6 recognized options table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub mode: Option<Mode>,
    pub max_papers_total: usize,
    pub max_pdf_download: usize,
    pub token_budget: u64,
    pub output_language: String,
    pub audit_pass_rate_floor: f64,
    pub gate_auto_approve: bool,
    pub gate_timeout_seconds: u64,
    pub min_cluster_size: usize,
    pub screening_batch_size: usize,
    pub contact_email: Option<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            mode: None,
            max_papers_total: 200,
            max_pdf_download: 40,
            token_budget: 2_000_000,
            output_language: "en".to_string(),
            audit_pass_rate_floor: 0.8,
            gate_auto_approve: false,
            gate_timeout_seconds: 3600,
            min_cluster_size: 3,
            screening_batch_size: 15,
            contact_email: None,
        }
    }
}

/// Top-level settings, persisted under `~/.citeflow/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    data_dir: PathBuf,
    #[serde(default)]
    pub options: PipelineOptions,
}

impl Config {
    fn base_dir() -> Result<PathBuf, ConfigError> {
        let mut base = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        base.push(".citeflow");
        Ok(base)
    }

    fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::base_dir()?.join("config.toml"))
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("citeflow.db")
    }

    pub fn pdf_cache_dir(&self) -> PathBuf {
        self.data_dir.join("pdf_cache")
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Loads the config, or creates one with defaults on first run: there
    /// is no "nothing configured yet" error to surface, just sensible
    /// defaults seeded in place (see DESIGN.md).
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Self::create_default();
        }
        let contents = fs::read_to_string(&path)?;
        Ok(toml::from_str(&contents)?)
    }

    fn create_default() -> Result<Self, ConfigError> {
        let data_dir = Self::base_dir()?;
        fs::create_dir_all(&data_dir)?;
        let config = Config {
            data_dir,
            options: PipelineOptions::default(),
        };
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path()?;
        fs::create_dir_all(config_path.parent().unwrap())?;
        fs::write(&config_path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_spec_defaults() {
        let opts = PipelineOptions::default();
        assert_eq!(opts.audit_pass_rate_floor, 0.8);
        assert_eq!(opts.gate_timeout_seconds, 3600);
        assert_eq!(opts.min_cluster_size, 3);
        assert_eq!(opts.screening_batch_size, 15);
    }
}
