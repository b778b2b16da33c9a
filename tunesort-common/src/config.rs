//! Configuration loading and path resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the source tree
pub const ENV_SOURCE: &str = "TUNESORT_SOURCE";
/// Environment variable overriding the destination tree
pub const ENV_DEST: &str = "TUNESORT_DEST";
/// Environment variable overriding the ledger database location
pub const ENV_LEDGER: &str = "TUNESORT_LEDGER";
/// Environment variable overriding the fuzzy match threshold
pub const ENV_FUZZY_THRESHOLD: &str = "TUNESORT_FUZZY_THRESHOLD";

/// Default similarity threshold for fuzzy ledger matches
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.95;
/// Default name of the holding area for files without usable metadata
pub const DEFAULT_UNSORTED_DIR: &str = "_Unsorted";
/// Default per-call timeout for normalization services
pub const DEFAULT_SERVICE_TIMEOUT_SECS: u64 = 30;

/// Contents of the TOML configuration file
///
/// Every field is optional; a missing file deserializes to `TomlConfig::default()`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub source_root: Option<PathBuf>,
    pub dest_root: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,
    pub fuzzy_threshold: Option<f64>,
    pub unsorted_dir_name: Option<String>,
    pub logging: LoggingConfig,
    /// External normalization services, consulted in file order
    pub services: Vec<ServiceConfig>,
}

/// `[logging]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// One `[[services]]` entry
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// Display name used in logs
    pub name: String,
    /// URL receiving the normalization POST
    pub endpoint: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Sent as a bearer token when present
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    DEFAULT_SERVICE_TIMEOUT_SECS
}

/// Default configuration file location (`<config_dir>/tunesort/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tunesort").join("config.toml"))
}

/// A TOML configuration and the file it came from
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub toml: TomlConfig,
    /// `None` when no file was found and defaults apply
    pub path: Option<PathBuf>,
}

impl LoadedConfig {
    /// Report where the configuration came from
    ///
    /// Loading happens before the subscriber exists, so this is called once
    /// logging is up.
    pub fn log_source(&self) {
        match &self.path {
            Some(path) => info!("Loaded config: {}", path.display()),
            None => warn!("No config file found, using defaults"),
        }
    }
}

/// Load the TOML configuration
///
/// An explicitly requested file must exist. When falling back to the default
/// location, a missing file yields compiled defaults.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(LoadedConfig::default()),
        },
    };

    Ok(LoadedConfig {
        toml: parse_toml_config(&path)?,
        path: Some(path),
    })
}

/// Parse a TOML configuration file
pub fn parse_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: TomlConfig =
        toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    for service in &config.services {
        validate_service(service)?;
    }
    Ok(config)
}

/// A zero timeout would expire every call before the service could answer
pub fn validate_service(service: &ServiceConfig) -> Result<()> {
    if service.timeout_secs == 0 {
        return Err(Error::Config(format!(
            "Service '{}' has timeout_secs = 0; use at least 1",
            service.name
        )));
    }
    Ok(())
}

/// Resolve a path setting: CLI → environment → TOML
///
/// Empty environment values are ignored.
pub fn resolve_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(value) = std::env::var(env_var_name) {
        if !value.trim().is_empty() {
            return Some(PathBuf::from(value));
        }
    }

    toml_value.map(Path::to_path_buf)
}

/// Fuzzy threshold: environment → TOML → default, validated
pub fn resolve_threshold(toml_value: Option<f64>) -> Result<f64> {
    let from_env = match std::env::var(ENV_FUZZY_THRESHOLD) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().parse::<f64>().map_err(|e| {
            Error::Config(format!("{} is not a number ({}): {}", ENV_FUZZY_THRESHOLD, value, e))
        })?),
        _ => None,
    };

    validate_threshold(from_env.or(toml_value).unwrap_or(DEFAULT_FUZZY_THRESHOLD))
}

/// Ledger location used when none is configured
pub fn default_ledger_path(dest_root: &Path) -> PathBuf {
    dest_root.join(".tunesort").join("ledger.db")
}

/// Check a fuzzy threshold is a ratio
pub fn validate_threshold(threshold: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(Error::Config(format!(
            "fuzzy_threshold must be between 0.0 and 1.0, got {}",
            threshold
        )))
    }
}
