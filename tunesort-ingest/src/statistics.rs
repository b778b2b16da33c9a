//! Run statistics
//!
//! Per-run counts of terminal outcomes, logged at the end of a pass.

use crate::pipeline::FileOutcome;
use serde::Serialize;

/// Outcome counts for one pipeline pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Files found in the source tree
    pub files_found: usize,
    pub imported: usize,
    /// Imported, but destination tags could not be rewritten
    pub tag_rewrite_failures: usize,
    pub skipped_exact: usize,
    pub skipped_fuzzy: usize,
    pub skipped_duplicate: usize,
    pub skipped_existing: usize,
    pub not_audio: usize,
    pub unsorted: usize,
    /// Dry-mode placements
    pub planned: usize,
    pub failed: usize,
    /// Normalization service calls made during the pass
    pub resolver_calls: usize,
}

impl RunSummary {
    /// Count one file outcome
    pub fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::SkippedExact { .. } => self.skipped_exact += 1,
            FileOutcome::SuppressedNotAudio => self.not_audio += 1,
            FileOutcome::SkippedFuzzy { .. } => self.skipped_fuzzy += 1,
            FileOutcome::DivertedUnsorted { .. } => self.unsorted += 1,
            FileOutcome::SkippedDuplicate { .. } => self.skipped_duplicate += 1,
            FileOutcome::SkippedExisting { .. } => self.skipped_existing += 1,
            FileOutcome::Imported { tag_error, .. } => {
                self.imported += 1;
                if tag_error.is_some() {
                    self.tag_rewrite_failures += 1;
                }
            }
            FileOutcome::Planned { .. } => self.planned += 1,
            FileOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Files that produced a new physical copy
    pub fn copies(&self) -> usize {
        self.imported + self.unsorted
    }

    pub fn display_string(&self) -> String {
        format!(
            "{} files: {} imported, {} unsorted, {} planned, {} already known, {} fuzzy matches, \
             {} duplicates, {} name collisions, {} not audio, {} failed ({} resolver calls)",
            self.files_found,
            self.imported,
            self.unsorted,
            self.planned,
            self.skipped_exact,
            self.skipped_fuzzy,
            self.skipped_duplicate,
            self.skipped_existing,
            self.not_audio,
            self.failed,
            self.resolver_calls
        )
    }
}
