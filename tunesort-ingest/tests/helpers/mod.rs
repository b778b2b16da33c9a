//! Test Helper Utilities
//!
//! Shared fixtures for tunesort-ingest integration tests

#![allow(dead_code)]

pub mod fakes;
pub mod library;

pub use fakes::{FakeTagIo, ScriptedService, TagWrite};
pub use library::Library;
