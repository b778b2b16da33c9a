//! # tunesort Common Library
//!
//! Shared code for the tunesort crates:
//! - Error and result types
//! - Configuration loading (TOML + environment)
//! - Tracing subscriber setup
//! - String normalization for comparison keys and filesystem names

pub mod config;
pub mod error;
pub mod logging;
pub mod normalize;

pub use error::{Error, Result};
