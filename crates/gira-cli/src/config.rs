//! `~/.config/gira/config.toml` and its mapping onto library settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gira_core::{ClientConfig, PassiveListenerOptions, RetryConfig};
use gira_types::DeviceIdentity;
use serde::{Deserialize, Serialize};

const DEFAULT_CONNECT_TIMEOUT: u64 = 60;
const DEFAULT_WRITE_TIMEOUT: u64 = 10;
const DEFAULT_ATTEMPTS: u32 = 5;
const DEFAULT_STALE_TIMEOUT: u64 = 900;

/// Upper bound for any timeout, in seconds.
const MAX_TIMEOUT: u64 = 3600;
/// Upper bound for connection attempts.
const MAX_ATTEMPTS: u32 = 20;

/// Settings read from the config file. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default cover address
    pub device: Option<String>,

    /// Display name of the default cover
    pub name: Option<String>,

    /// Per-attempt connection timeout in seconds
    pub connect_timeout: u64,

    /// Write timeout in seconds
    pub write_timeout: u64,

    /// Connection attempts per command
    pub attempts: u32,

    /// Keep the connection open between commands
    pub keep_alive: bool,

    /// Seconds without broadcasts before a cover is reported unavailable
    pub stale_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: None,
            name: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            attempts: DEFAULT_ATTEMPTS,
            keep_alive: false,
            stale_timeout: DEFAULT_STALE_TIMEOUT,
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gira")
            .join("config.toml")
    }

    /// Load config from `path`, or return the default if the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Like [`load_or_default`](Self::load_or_default), but rejects
    /// settings that fail [`validate`](Self::validate).
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_or_default(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save config to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if let Some(device) = &self.device
            && device.trim().is_empty()
        {
            errors.push(ValidationError {
                field: "device".to_string(),
                message: "address cannot be empty".to_string(),
            });
        }

        for (field, value) in [
            ("connect_timeout", self.connect_timeout),
            ("write_timeout", self.write_timeout),
            ("stale_timeout", self.stale_timeout),
        ] {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.to_string(),
                    message: "must be at least 1 second".to_string(),
                });
            } else if value > MAX_TIMEOUT {
                errors.push(ValidationError {
                    field: field.to_string(),
                    message: format!("must be at most {} seconds", MAX_TIMEOUT),
                });
            }
        }

        if self.attempts == 0 || self.attempts > MAX_ATTEMPTS {
            errors.push(ValidationError {
                field: "attempts".to_string(),
                message: format!("must be between 1 and {}", MAX_ATTEMPTS),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Identity of the cover to talk to.
    ///
    /// `device` (from `--device` or `GIRA_DEVICE`) overrides the configured
    /// address. The configured name is only used for the configured address.
    pub fn identity(&self, device: Option<&str>) -> Option<DeviceIdentity> {
        let address = device
            .map(str::to_string)
            .or_else(|| self.device.clone())?;
        let name = match (&self.device, &self.name) {
            (Some(configured), Some(name)) if configured.eq_ignore_ascii_case(&address) => {
                name.clone()
            }
            _ => address.clone(),
        };
        Some(DeviceIdentity::new(address, name))
    }

    /// Connection settings, with command-line overrides applied.
    pub fn client_config(&self, timeout: Option<u64>, attempts: Option<u32>) -> ClientConfig {
        let attempts = attempts.unwrap_or(self.attempts);
        ClientConfig::default()
            .connect_timeout(Duration::from_secs(timeout.unwrap_or(self.connect_timeout)))
            .write_timeout(Duration::from_secs(self.write_timeout))
            .retry(RetryConfig::with_attempts(attempts))
            .keep_alive(self.keep_alive)
    }

    /// Broadcast listener settings.
    pub fn listener_options(&self) -> PassiveListenerOptions {
        PassiveListenerOptions::default().unavailable_after(Duration::from_secs(self.stale_timeout))
    }
}

/// Errors from loading, saving or validating the config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is not valid TOML: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Cannot render config as TOML: {0}")]
    Serialize(toml::ser::Error),
    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid settings:\n{}", list_problems(.0))]
    Validation(Vec<ValidationError>),
}

/// One rejected setting.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// TOML key of the setting.
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn list_problems(errors: &[ValidationError]) -> String {
    let mut out = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str("  * ");
        out.push_str(&e.to_string());
    }
    out
}
