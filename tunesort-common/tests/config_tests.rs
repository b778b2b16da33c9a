//! Configuration resolution tests
//!
//! Tests that manipulate TUNESORT_* variables are marked #[serial]
//! so they never observe each other's environment.

use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tunesort_common::config::{resolve_path, ENV_DEST, ENV_LEDGER};

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(ENV_DEST, "/from/env");

    let resolved = resolve_path(
        Some(Path::new("/from/cli")),
        ENV_DEST,
        Some(Path::new("/from/toml")),
    );
    assert_eq!(resolved, Some(PathBuf::from("/from/cli")));

    env::remove_var(ENV_DEST);
}

#[test]
#[serial]
fn test_env_over_toml() {
    env::set_var(ENV_DEST, "/from/env");

    let resolved = resolve_path(None, ENV_DEST, Some(Path::new("/from/toml")));
    assert_eq!(resolved, Some(PathBuf::from("/from/env")));

    env::remove_var(ENV_DEST);
}

#[test]
#[serial]
fn test_blank_env_falls_through_to_toml() {
    env::set_var(ENV_LEDGER, "   ");

    let resolved = resolve_path(None, ENV_LEDGER, Some(Path::new("/from/toml/ledger.db")));
    assert_eq!(resolved, Some(PathBuf::from("/from/toml/ledger.db")));

    env::remove_var(ENV_LEDGER);
}

#[test]
#[serial]
fn test_nothing_configured() {
    env::remove_var(ENV_LEDGER);
    assert_eq!(resolve_path(None, ENV_LEDGER, None), None);
}
