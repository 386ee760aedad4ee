//! Configuration management for invoice-validator
//!
//! TOML-based configuration with defaults and validation.
//! Location: ~/.invoice-validator/config.toml

use crate::errors::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default parse confidence at or above which validation runs
pub const DEFAULT_CONFIDENCE_THRESHOLD: u8 = 70;

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub pipeline: PipelineSettings,
    pub paths: PathsConfig,
}

/// Which executors back the pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Deterministic parse, rule engine and template report
    Local,
    /// Ollama model for every stage
    Ollama,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Local => write!(f, "local"),
            Backend::Ollama => write!(f, "ollama"),
        }
    }
}

impl FromStr for Backend {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Backend::Local),
            "ollama" => Ok(Backend::Ollama),
            other => Err(PipelineError::ConfigError(format!(
                "Unknown backend '{}' (expected local or ollama)",
                other
            ))),
        }
    }
}

/// Model connection and sampling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: Backend,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Pipeline behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub confidence_threshold: u8,
    pub stage_timeout_secs: u64,
    pub preview_chars: usize,
}

/// File system paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub reports_dir: String,
    pub log_dir: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Local,
            host: "127.0.0.1".to_string(),
            port: 11434,
            model: "qwen2.5:7b-instruct".to_string(),
            temperature: 0.0,
            max_tokens: 2048,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            stage_timeout_secs: 300,
            preview_chars: 100,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            reports_dir: "outputs/reports".to_string(),
            log_dir: "logs".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Standard config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".invoice-validator").join("config.toml"))
    }

    /// Load from the standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    /// Write the defaults to `path` (or the standard location); returns the path written
    pub fn init_file(path: Option<PathBuf>, force: bool) -> Result<PathBuf> {
        let path = path.or_else(Self::default_path).ok_or_else(|| {
            PipelineError::ConfigError("No home directory; pass --config".to_string())
        })?;

        if path.exists() && !force {
            return Err(PipelineError::ConfigError(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }

        Config::default().save(&path)?;
        Ok(path)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.confidence_threshold > 100 {
            return Err(PipelineError::ConfigError(
                "confidence_threshold must be between 0 and 100".to_string(),
            ));
        }

        if self.pipeline.stage_timeout_secs == 0 {
            return Err(PipelineError::ConfigError(
                "stage_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.preview_chars == 0 {
            return Err(PipelineError::ConfigError(
                "preview_chars must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(PipelineError::ConfigError(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.llm.backend == Backend::Ollama && self.llm.model.trim().is_empty() {
            return Err(PipelineError::ConfigError(
                "model must be set for the ollama backend".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::ConfigError(format!("Failed to create config dir: {}", e))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::ConfigError(format!("Failed to serialize config: {}", e)))
    }

    /// Ollama base URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.llm.host, self.llm.port)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline.stage_timeout_secs)
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    pub fn reports_dir(&self) -> PathBuf {
        Self::expand_path(&self.paths.reports_dir)
    }

    pub fn log_dir(&self) -> PathBuf {
        Self::expand_path(&self.paths.log_dir)
    }
}
