//! Configuration resolution for tunesort-ingest
//!
//! Combines CLI overrides, environment variables and the TOML file into one
//! immutable [`IngestConfig`] handed to the pipeline.

use std::path::{Path, PathBuf};
use tunesort_common::config::{
    default_ledger_path, resolve_path, resolve_threshold, ServiceConfig, TomlConfig,
    DEFAULT_FUZZY_THRESHOLD, DEFAULT_UNSORTED_DIR, ENV_DEST, ENV_LEDGER, ENV_SOURCE,
};
use tunesort_common::{Error, Result};

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source_root: Option<PathBuf>,
    pub dest_root: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
    pub ledger_path: PathBuf,
    pub fuzzy_threshold: f64,
    pub unsorted_dir_name: String,
    /// Normalization services in chain order (disabled entries included)
    pub services: Vec<ServiceConfig>,
}

impl IngestConfig {
    /// Defaults for the given trees: ledger inside the destination, no services
    pub fn new(source_root: impl Into<PathBuf>, dest_root: impl Into<PathBuf>) -> Self {
        let dest_root = dest_root.into();
        Self {
            source_root: source_root.into(),
            ledger_path: default_ledger_path(&dest_root),
            dest_root,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            unsorted_dir_name: DEFAULT_UNSORTED_DIR.to_string(),
            services: Vec::new(),
        }
    }

    /// Resolve every setting: CLI → environment → TOML → default
    pub fn resolve(overrides: &ConfigOverrides, toml: &TomlConfig) -> Result<Self> {
        let source_root = resolve_path(
            overrides.source_root.as_deref(),
            ENV_SOURCE,
            toml.source_root.as_deref(),
        )
        .ok_or_else(|| {
            Error::Config(format!(
                "Source folder not configured (use --source, {} or source_root in config)",
                ENV_SOURCE
            ))
        })?;

        let dest_root = resolve_dest_root(overrides, toml)?;
        let ledger_path = resolve_ledger_path(overrides, toml, &dest_root);

        let fuzzy_threshold = resolve_threshold(toml.fuzzy_threshold)?;

        let unsorted_dir_name = toml
            .unsorted_dir_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_UNSORTED_DIR)
            .to_string();

        Ok(Self {
            source_root,
            dest_root,
            ledger_path,
            fuzzy_threshold,
            unsorted_dir_name,
            services: toml.services.clone(),
        })
    }
}

fn resolve_dest_root(overrides: &ConfigOverrides, toml: &TomlConfig) -> Result<PathBuf> {
    resolve_path(
        overrides.dest_root.as_deref(),
        ENV_DEST,
        toml.dest_root.as_deref(),
    )
    .ok_or_else(|| {
        Error::Config(format!(
            "Destination folder not configured (use --dest, {} or dest_root in config)",
            ENV_DEST
        ))
    })
}

fn resolve_ledger_path(overrides: &ConfigOverrides, toml: &TomlConfig, dest_root: &Path) -> PathBuf {
    resolve_path(
        overrides.ledger_path.as_deref(),
        ENV_LEDGER,
        toml.ledger_path.as_deref(),
    )
    .unwrap_or_else(|| default_ledger_path(dest_root))
}

/// Ledger location for ledger-only commands (cleanup, stats)
///
/// Needs either an explicit ledger path or a destination to derive it from.
pub fn resolve_ledger_only(overrides: &ConfigOverrides, toml: &TomlConfig) -> Result<PathBuf> {
    if let Some(path) = resolve_path(
        overrides.ledger_path.as_deref(),
        ENV_LEDGER,
        toml.ledger_path.as_deref(),
    ) {
        return Ok(path);
    }

    let dest_root = resolve_dest_root(overrides, toml)?;
    Ok(default_ledger_path(&dest_root))
}
