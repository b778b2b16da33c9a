//! Organize pipeline
//!
//! Carries one source file at a time through an explicit state machine:
//!
//! ```text
//! ExactLedgerCheck → TypeCheck → Extract → FuzzyCheckRaw → Resolve
//!     → FuzzyCheckResolved → Place → Copy → EnrichTags → RecordImport
//! ```
//!
//! Every stage either advances to the next one or finishes the file with a
//! [`FileOutcome`]. Each terminal outcome writes exactly one ledger entry,
//! except `SkippedExact` (a prior entry already exists), `Planned` (dry modes)
//! and `Failed` (transient fault; the file is retried next run).
//!
//! Files are processed strictly in sequence; no fault in one file stops the run.

use crate::config::IngestConfig;
use crate::extractor::MetadataExtractor;
use crate::ledger::{BulkSeedReport, ImportLedger, ImportRecord, SuppressionReason};
use crate::placement::{copy_no_overwrite, CopyOutcome, Placement, PlacementCheck, PlacementEngine};
use crate::resolver::{MetadataResolver, NormalizeRequest, ResolutionResult};
use crate::scanner::{dotted_extension, is_audio_file, ScanError, SourceScanner};
use crate::statistics::RunSummary;
use crate::tags::{EmbeddedTags, LoftyTagIo, TagIo};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tunesort_common::normalize::split_artists;
use tunesort_common::{Error, Result};

/// Run-mode flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMode {
    /// No resolver calls, no copies, no ledger writes
    pub dry_run: bool,
    /// Resolver calls allowed, no copies, no ledger writes
    pub dry_resolve: bool,
    /// Log the stage trail of every file
    pub debug: bool,
}

impl RunMode {
    pub fn writes(&self) -> bool {
        !self.dry_run && !self.dry_resolve
    }

    pub fn calls_resolver(&self) -> bool {
        !self.dry_run
    }
}

/// One source file on its way through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub source: PathBuf,
    pub original_name: String,
    /// Lower-cased, with leading dot (or empty)
    pub extension: String,
    pub tags: EmbeddedTags,
    pub artist: Option<String>,
    /// Full collaborator list, primary first
    pub artists: Vec<String>,
    pub title: Option<String>,
}

impl Track {
    /// `None` for paths without a file name
    pub fn from_path(path: &Path) -> Option<Self> {
        let original_name = path.file_name()?.to_string_lossy().to_string();
        Some(Self {
            source: path.to_path_buf(),
            original_name,
            extension: dotted_extension(path),
            tags: EmbeddedTags::default(),
            artist: None,
            artists: Vec::new(),
            title: None,
        })
    }

    fn keep_embedded(&mut self) -> bool {
        let Some((artist, title)) = self.tags.artist_and_title() else {
            return false;
        };
        self.artists = split_artists(artist);
        self.artist = Some(artist.to_string());
        self.title = Some(title.to_string());
        true
    }

    fn resolved_pair(&self) -> Option<(&str, &str)> {
        match (self.artist.as_deref(), self.title.as_deref()) {
            (Some(artist), Some(title)) => Some((artist, title)),
            _ => None,
        }
    }
}

/// Pipeline stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    ExactLedgerCheck,
    TypeCheck,
    Extract,
    FuzzyCheckRaw,
    Resolve,
    FuzzyCheckResolved,
    Place,
    Copy(Placement),
    EnrichTags(PathBuf),
    RecordImport {
        destination: PathBuf,
        tag_error: Option<String>,
    },
}

/// Terminal outcome for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Name already in the ledger; nothing written
    SkippedExact { record_id: i64 },
    SuppressedNotAudio,
    /// Linked to an existing import instead of copying
    SkippedFuzzy { storage_path: PathBuf },
    /// Copied to the unsorted area and suppressed as `no_metadata`
    DivertedUnsorted { destination: PathBuf },
    /// Same title already in the artist directory
    SkippedDuplicate { existing: PathBuf },
    /// Destination name taken by another file
    SkippedExisting { destination: PathBuf },
    Imported {
        destination: PathBuf,
        /// Set when the copy succeeded but its tags could not be rewritten
        tag_error: Option<String>,
    },
    /// Dry modes: where the file would have gone
    Planned { destination: PathBuf },
    /// Transient fault; no ledger entry
    Failed { reason: String },
}

/// Result of one state-machine step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Next(Stage),
    Finish(FileOutcome),
}

/// Organize pipeline
pub struct OrganizePipeline {
    config: IngestConfig,
    mode: RunMode,
    ledger: ImportLedger,
    extractor: MetadataExtractor,
    resolver: MetadataResolver,
    placement: PlacementEngine,
    tag_io: Arc<dyn TagIo>,
}

impl OrganizePipeline {
    /// Assemble a pipeline from ready components
    pub fn new(
        config: IngestConfig,
        mode: RunMode,
        ledger: ImportLedger,
        resolver: MetadataResolver,
        tag_io: Arc<dyn TagIo>,
    ) -> Self {
        let placement = PlacementEngine::new(&config.dest_root, config.unsorted_dir_name.clone());
        Self {
            extractor: MetadataExtractor::new(tag_io.clone()),
            config,
            mode,
            ledger,
            resolver,
            placement,
            tag_io,
        }
    }

    /// Open the configured ledger and build the production components
    pub async fn open(config: IngestConfig, mode: RunMode) -> Result<Self> {
        let ledger = ImportLedger::open(&config.ledger_path).await?;
        let resolver = MetadataResolver::from_config(&config.services);
        info!(
            ledger = %config.ledger_path.display(),
            services = resolver.service_count(),
            "Pipeline ready"
        );
        Ok(Self::new(config, mode, ledger, resolver, Arc::new(LoftyTagIo::new())))
    }

    pub fn ledger(&self) -> &ImportLedger {
        &self.ledger
    }

    pub fn resolver(&self) -> &MetadataResolver {
        &self.resolver
    }

    fn scanner(&self) -> SourceScanner {
        SourceScanner::new().exclude(&self.config.dest_root)
    }

    /// One pass over the source tree
    pub async fn run(&self) -> Result<RunSummary> {
        let files = self
            .scanner()
            .scan(&self.config.source_root)
            .map_err(scan_error)?;

        info!(
            source = %self.config.source_root.display(),
            dest = %self.config.dest_root.display(),
            files = files.len(),
            dry_run = self.mode.dry_run,
            dry_resolve = self.mode.dry_resolve,
            "Starting organize pass"
        );

        let calls_before = self.resolver.calls_made();
        let mut summary = RunSummary {
            files_found: files.len(),
            ..Default::default()
        };

        for file in &files {
            let outcome = self.process_file(file).await;
            summary.record(&outcome);
        }

        summary.resolver_calls = self.resolver.calls_made() - calls_before;
        info!("Organize pass complete: {}", summary.display_string());
        Ok(summary)
    }

    /// Freeze the source tree: suppress every file not yet in the ledger
    pub async fn bulk_seed(&self) -> Result<BulkSeedReport> {
        self.ledger
            .bulk_seed(&self.scanner(), &self.config.source_root)
            .await
    }

    /// Carry one file through the state machine
    pub async fn process_file(&self, path: &Path) -> FileOutcome {
        let Some(mut track) = Track::from_path(path) else {
            return FileOutcome::Failed {
                reason: format!("No file name: {}", path.display()),
            };
        };

        let mut stage = Stage::ExactLedgerCheck;
        let mut trail: Vec<String> = Vec::new();

        let outcome = loop {
            if self.mode.debug {
                trail.push(stage_name(&stage).to_string());
            }
            debug!(file = %track.original_name, stage = stage_name(&stage), "Stage");

            match self.step(&mut track, stage).await {
                Ok(Transition::Next(next)) => stage = next,
                Ok(Transition::Finish(outcome)) => break outcome,
                Err(e) => {
                    error!(file = %path.display(), error = %e, "File processing failed");
                    break FileOutcome::Failed {
                        reason: e.to_string(),
                    };
                }
            }
        };

        if self.mode.debug {
            info!(file = %track.original_name, trail = %trail.join(" → "), "Stage trail");
        }
        info!(file = %track.original_name, outcome = ?outcome, "Processed");
        outcome
    }

    /// Execute one stage
    pub async fn step(&self, track: &mut Track, stage: Stage) -> Result<Transition> {
        match stage {
            Stage::ExactLedgerCheck => self.exact_ledger_check(track).await,
            Stage::TypeCheck => self.type_check(track).await,
            Stage::Extract => {
                track.tags = self.extractor.extract(&track.source);
                Ok(Transition::Next(Stage::FuzzyCheckRaw))
            }
            Stage::FuzzyCheckRaw => {
                let Some((artist, title)) = track.tags.artist_and_title() else {
                    return Ok(Transition::Next(Stage::Resolve));
                };
                let (artist, title) = (artist.to_string(), title.to_string());
                self.fuzzy_check(track, &artist, &title, Stage::Resolve).await
            }
            Stage::Resolve => self.resolve(track).await,
            Stage::FuzzyCheckResolved => {
                let Some((artist, title)) = track.resolved_pair() else {
                    return self.divert_unsorted(track).await;
                };
                let (artist, title) = (artist.to_string(), title.to_string());
                self.fuzzy_check(track, &artist, &title, Stage::Place).await
            }
            Stage::Place => self.place(track).await,
            Stage::Copy(placement) => self.copy(track, placement).await,
            Stage::EnrichTags(destination) => Ok(self.enrich_tags(track, destination)),
            Stage::RecordImport {
                destination,
                tag_error,
            } => self.record_import(track, destination, tag_error).await,
        }
    }

    async fn exact_ledger_check(&self, track: &Track) -> Result<Transition> {
        match self.ledger.lookup_exact(&track.original_name).await? {
            Some(record) => {
                debug!(file = %track.original_name, id = record.id, storage = %record.storage_path, "Already in ledger");
                Ok(Transition::Finish(FileOutcome::SkippedExact {
                    record_id: record.id,
                }))
            }
            None => Ok(Transition::Next(Stage::TypeCheck)),
        }
    }

    async fn type_check(&self, track: &Track) -> Result<Transition> {
        if is_audio_file(&track.source) {
            return Ok(Transition::Next(Stage::Extract));
        }

        self.suppress(track, SuppressionReason::NotAudio).await?;
        Ok(Transition::Finish(FileOutcome::SuppressedNotAudio))
    }

    /// Link to an existing import if one is similar enough, else go to `next`
    async fn fuzzy_check(
        &self,
        track: &Track,
        artist: &str,
        title: &str,
        next: Stage,
    ) -> Result<Transition> {
        let Some(record) = self
            .ledger
            .lookup_fuzzy(artist, title, self.config.fuzzy_threshold)
            .await?
        else {
            return Ok(Transition::Next(next));
        };

        let storage_path = PathBuf::from(&record.storage_path);
        if !storage_path.is_file() {
            warn!(
                file = %track.original_name,
                id = record.id,
                storage = %record.storage_path,
                "Fuzzy match points at a missing file, ignoring it"
            );
            return Ok(Transition::Next(next));
        }

        self.link_to_existing(track, &record).await?;
        Ok(Transition::Finish(FileOutcome::SkippedFuzzy { storage_path }))
    }

    /// Ledger the new name against the matched record's metadata and copy
    async fn link_to_existing(&self, track: &Track, record: &ImportRecord) -> Result<()> {
        info!(
            file = %track.original_name,
            matched = %record.original_name,
            storage = %record.storage_path,
            "Fuzzy ledger match, reusing existing copy"
        );
        if self.mode.writes() {
            self.ledger
                .insert_import(
                    &track.original_name,
                    &record.ai_artist,
                    &record.ai_title,
                    Path::new(&record.storage_path),
                )
                .await?;
        }
        Ok(())
    }

    async fn resolve(&self, track: &mut Track) -> Result<Transition> {
        let result = if self.mode.calls_resolver() {
            let request = NormalizeRequest::new(
                track.original_name.clone(),
                track.tags.artist.clone(),
                track.tags.title.clone(),
            );
            self.resolver.resolve(&request).await
        } else if track.tags.artist_and_title().is_some() {
            ResolutionResult::UseAsIs
        } else {
            ResolutionResult::Unresolved
        };

        match result {
            ResolutionResult::UseAsIs => {
                track.keep_embedded();
            }
            ResolutionResult::Resolved {
                artist,
                artists,
                title,
            } => {
                track.artist = Some(artist);
                track.artists = artists;
                track.title = Some(title);
            }
            ResolutionResult::Unresolved => {
                if track.keep_embedded() {
                    warn!(file = %track.original_name, "Resolver gave no answer, keeping embedded tags");
                } else {
                    return self.divert_unsorted(track).await;
                }
            }
        }

        Ok(Transition::Next(Stage::FuzzyCheckResolved))
    }

    async fn place(&self, track: &Track) -> Result<Transition> {
        let Some((artist, title)) = track.resolved_pair() else {
            return self.divert_unsorted(track).await;
        };
        let Some(placement) = self.placement.plan(artist, title, &track.extension) else {
            warn!(file = %track.original_name, artist, title, "Artist or title unusable as a path");
            return self.divert_unsorted(track).await;
        };

        match self.placement.check(&placement) {
            PlacementCheck::Duplicate(existing) => {
                info!(file = %track.original_name, existing = %existing.display(), "Duplicate title in destination");
                self.suppress(track, SuppressionReason::Duplicate).await?;
                Ok(Transition::Finish(FileOutcome::SkippedDuplicate { existing }))
            }
            PlacementCheck::DestinationExists => {
                warn!(file = %track.original_name, dest = %placement.destination.display(), "Destination exists, not overwriting");
                self.suppress(track, SuppressionReason::DestinationExists).await?;
                Ok(Transition::Finish(FileOutcome::SkippedExisting {
                    destination: placement.destination,
                }))
            }
            PlacementCheck::Clear if !self.mode.writes() => {
                info!(file = %track.original_name, dest = %placement.destination.display(), "Would copy");
                Ok(Transition::Finish(FileOutcome::Planned {
                    destination: placement.destination,
                }))
            }
            PlacementCheck::Clear => Ok(Transition::Next(Stage::Copy(placement))),
        }
    }

    async fn copy(&self, track: &Track, placement: Placement) -> Result<Transition> {
        match copy_no_overwrite(&track.source, &placement.destination) {
            Ok(CopyOutcome::Copied) => {
                info!(file = %track.original_name, dest = %placement.destination.display(), "Copied");
                Ok(Transition::Next(Stage::EnrichTags(placement.destination)))
            }
            Ok(CopyOutcome::AlreadyExists) => {
                warn!(file = %track.original_name, dest = %placement.destination.display(), "Destination appeared before copy, not overwriting");
                self.suppress(track, SuppressionReason::DestinationExists).await?;
                Ok(Transition::Finish(FileOutcome::SkippedExisting {
                    destination: placement.destination,
                }))
            }
            Err(e) => {
                error!(file = %track.original_name, dest = %placement.destination.display(), error = %e, "Copy failed, will retry next run");
                Ok(Transition::Finish(FileOutcome::Failed {
                    reason: format!("Copy failed: {}", e),
                }))
            }
        }
    }

    /// Rewrite artist/title in the copy; failures are logged, never fatal
    ///
    /// Runs for kept embedded tags too, so a joined artist string is split
    /// into primary and collaborator fields.
    fn enrich_tags(&self, track: &Track, destination: PathBuf) -> Transition {
        let tag_error = match &track.title {
            Some(title) => {
                match self.tag_io.write_artist_title(&destination, &track.artists, title) {
                    Ok(report) => {
                        debug!(dest = %destination.display(), tag_type = %report.tag_type, multi_artist = report.multi_artist, "Tags rewritten");
                        for collaborator in &report.unsupported_collaborators {
                            warn!(
                                dest = %destination.display(),
                                tag_type = %report.tag_type,
                                collaborator = %collaborator,
                                "Container supports a single artist field, collaborator not written"
                            );
                        }
                        None
                    }
                    Err(e) => {
                        warn!(dest = %destination.display(), error = %e, "Tag rewrite failed, keeping import");
                        Some(e.to_string())
                    }
                }
            }
            None => None,
        };

        Transition::Next(Stage::RecordImport {
            destination,
            tag_error,
        })
    }

    async fn record_import(
        &self,
        track: &Track,
        destination: PathBuf,
        tag_error: Option<String>,
    ) -> Result<Transition> {
        let (artist, title) = track
            .resolved_pair()
            .ok_or_else(|| Error::Internal("Recording import without artist/title".to_string()))?;

        self.ledger
            .insert_import(&track.original_name, artist, title, &destination)
            .await?;

        Ok(Transition::Finish(FileOutcome::Imported {
            destination,
            tag_error,
        }))
    }

    /// Copy to the unsorted area and suppress as `no_metadata`
    async fn divert_unsorted(&self, track: &Track) -> Result<Transition> {
        let destination = self.placement.unsorted_path(&track.original_name);

        if !self.mode.writes() {
            info!(file = %track.original_name, dest = %destination.display(), "Would divert to unsorted");
            return Ok(Transition::Finish(FileOutcome::Planned { destination }));
        }

        match copy_no_overwrite(&track.source, &destination) {
            Ok(CopyOutcome::Copied) => {
                info!(file = %track.original_name, dest = %destination.display(), "No metadata, diverted to unsorted");
            }
            Ok(CopyOutcome::AlreadyExists) => {
                warn!(file = %track.original_name, dest = %destination.display(), "Unsorted copy already exists, not overwriting");
            }
            Err(e) => {
                error!(file = %track.original_name, dest = %destination.display(), error = %e, "Unsorted copy failed, will retry next run");
                return Ok(Transition::Finish(FileOutcome::Failed {
                    reason: format!("Copy failed: {}", e),
                }));
            }
        }

        self.suppress(track, SuppressionReason::NoMetadata).await?;
        Ok(Transition::Finish(FileOutcome::DivertedUnsorted { destination }))
    }

    async fn suppress(&self, track: &Track, reason: SuppressionReason) -> Result<()> {
        if self.mode.writes() {
            self.ledger
                .insert_suppression(&track.original_name, reason)
                .await?;
        } else {
            debug!(file = %track.original_name, %reason, "Would suppress");
        }
        Ok(())
    }
}

fn stage_name(stage: &Stage) -> &'static str {
    match stage {
        Stage::ExactLedgerCheck => "ExactLedgerCheck",
        Stage::TypeCheck => "TypeCheck",
        Stage::Extract => "Extract",
        Stage::FuzzyCheckRaw => "FuzzyCheckRaw",
        Stage::Resolve => "Resolve",
        Stage::FuzzyCheckResolved => "FuzzyCheckResolved",
        Stage::Place => "Place",
        Stage::Copy(_) => "Copy",
        Stage::EnrichTags(_) => "EnrichTags",
        Stage::RecordImport { .. } => "RecordImport",
    }
}

fn scan_error(e: ScanError) -> Error {
    match e {
        ScanError::PathNotFound(p) => Error::NotFound(p.display().to_string()),
        ScanError::NotADirectory(p) => Error::InvalidInput(format!("Not a directory: {}", p.display())),
    }
}
