//! Server configuration: TOML file plus environment overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Names the configuration file to load.
pub const CONFIG_ENV: &str = "MICR_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "micr.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    pub ocr: OcrSettings,
    pub platform: PlatformSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcrSettings {
    pub tessdata_dir: PathBuf,
    pub language: String,
    pub engine_instances: usize,
    pub acquire_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlatformSettings {
    /// Start even when the OS or CPU architecture is not recognized.
    pub allow_unknown: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 10 * 1024 * 1024,
            ocr: OcrSettings::default(),
            platform: PlatformSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            tessdata_dir: PathBuf::from("/usr/share/tesseract-ocr/5/tessdata"),
            language: "e13b".to_string(),
            engine_instances: 1,
            acquire_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl OcrSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl ServerConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Load from `$MICR_CONFIG` (which must exist when set) or `./micr.toml`
    /// (optional), then apply `MICR_*` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `MICR_HOST`, `MICR_PORT` and `MICR_TESSDATA_DIR`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(host) = lookup("MICR_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("MICR_PORT") {
            self.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { var: "MICR_PORT", value: port })?;
        }
        if let Some(dir) = lookup("MICR_TESSDATA_DIR") {
            self.ocr.tessdata_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ocr.engine_instances == 0 {
            return Err(ConfigError::Invalid("ocr.engine_instances must be at least 1".into()));
        }
        if self.ocr.acquire_timeout_ms == 0 || self.ocr.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("ocr timeouts must be non-zero".into()));
        }
        // Otherwise a saturated pool reports extraction_timeout, never engine_busy.
        if self.ocr.acquire_timeout_ms >= self.ocr.request_timeout_ms {
            return Err(ConfigError::Invalid(
                "ocr.acquire_timeout_ms must be less than ocr.request_timeout_ms".into(),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("max_body_bytes must be non-zero".into()));
        }
        Ok(())
    }
}
