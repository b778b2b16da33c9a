//! tunesort-ingest library interface
//!
//! Organizes a tree of audio files into `dest/<artist>/<title><ext>`, backed
//! by an import ledger that keeps repeated runs idempotent.

pub mod config;
pub mod extractor;
pub mod ledger;
pub mod pipeline;
pub mod placement;
pub mod resolver;
pub mod scanner;
pub mod statistics;
pub mod tags;

pub use crate::config::{ConfigOverrides, IngestConfig};
pub use crate::extractor::MetadataExtractor;
pub use crate::ledger::{BulkSeedReport, ImportLedger, ImportRecord, LedgerStats, SuppressionReason};
pub use crate::pipeline::{FileOutcome, OrganizePipeline, RunMode, Stage, Track, Transition};
pub use crate::placement::{Placement, PlacementCheck, PlacementEngine};
pub use crate::resolver::{
    MetadataResolver, NormalizationService, NormalizeRequest, NormalizeResponse, ResolutionResult,
    ServiceError,
};
pub use crate::statistics::RunSummary;
pub use crate::tags::{EmbeddedTags, LoftyTagIo, TagError, TagIo, TagWriteReport};
pub use tunesort_common::normalize;
