//! Destination placement
//!
//! Layout: `dest_root/<primary artist>/<title><ext>`, plus
//! `dest_root/<unsorted>/<original filename>` for files without metadata.
//! Copies never overwrite an existing file.

use crate::scanner::is_audio_file;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tunesort_common::normalize::{identity_key, primary_artist, sanitize_for_path};

/// Where a resolved track would go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub artist_dir: PathBuf,
    pub destination: PathBuf,
    /// Comparison key of the title, for duplicate detection
    pub title_key: String,
}

/// Result of checking a placement against what is on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementCheck {
    Clear,
    /// Audio file with the same title key already in the artist directory
    Duplicate(PathBuf),
    /// Destination name taken by a file with a different title key
    DestinationExists,
}

/// Result of a no-overwrite copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    AlreadyExists,
}

/// Placement engine
#[derive(Debug, Clone)]
pub struct PlacementEngine {
    dest_root: PathBuf,
    unsorted_dir_name: String,
}

impl PlacementEngine {
    pub fn new(dest_root: impl Into<PathBuf>, unsorted_dir_name: impl Into<String>) -> Self {
        Self {
            dest_root: dest_root.into(),
            unsorted_dir_name: unsorted_dir_name.into(),
        }
    }

    /// Compute the destination for a resolved track
    ///
    /// Only the primary artist names the directory. Returns `None` when the
    /// artist or title sanitizes to nothing.
    pub fn plan(&self, artist: &str, title: &str, extension: &str) -> Option<Placement> {
        let artist_dir_name = sanitize_for_path(primary_artist(artist)?);
        let file_stem = sanitize_for_path(title);
        if artist_dir_name.is_empty() || file_stem.is_empty() {
            return None;
        }

        let artist_dir = self.dest_root.join(artist_dir_name);
        let destination = artist_dir.join(format!("{}{}", file_stem, extension));

        Some(Placement {
            artist_dir,
            destination,
            title_key: identity_key(title),
        })
    }

    /// Holding-area path for a file without usable metadata
    pub fn unsorted_path(&self, original_name: &str) -> PathBuf {
        self.dest_root
            .join(&self.unsorted_dir_name)
            .join(sanitize_for_path(original_name))
    }

    /// Look for an audio file in the artist directory with the same title key
    ///
    /// Extension-independent: `Song.mp3` duplicates `Song.flac`. An empty
    /// title key never matches.
    pub fn find_duplicate(&self, placement: &Placement) -> Option<PathBuf> {
        if placement.title_key.is_empty() {
            return None;
        }

        let entries = match fs::read_dir(&placement.artist_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(dir = %placement.artist_dir.display(), error = %e, "Cannot read artist directory");
                return None;
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_audio_file(path))
            .find(|path| {
                path.file_stem()
                    .map(|stem| identity_key(&stem.to_string_lossy()) == placement.title_key)
                    .unwrap_or(false)
            })
    }

    /// Check a placement against the destination tree
    pub fn check(&self, placement: &Placement) -> PlacementCheck {
        if let Some(existing) = self.find_duplicate(placement) {
            return PlacementCheck::Duplicate(existing);
        }
        if placement.destination.exists() {
            return PlacementCheck::DestinationExists;
        }
        PlacementCheck::Clear
    }
}

/// Copy `src` to `dest`, creating parent directories, never overwriting
///
/// A partially written destination is removed on failure.
pub fn copy_no_overwrite(src: &Path, dest: &Path) -> io::Result<CopyOutcome> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut target = match OpenOptions::new().write(true).create_new(true).open(dest) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(CopyOutcome::AlreadyExists),
        Err(e) => return Err(e),
    };

    let result = File::open(src).and_then(|mut source| io::copy(&mut source, &mut target));
    if let Err(e) = result {
        drop(target);
        if let Err(cleanup) = fs::remove_file(dest) {
            tracing::warn!(dest = %dest.display(), error = %cleanup, "Could not remove partial copy");
        }
        return Err(e);
    }

    target.sync_all()?;
    Ok(CopyOutcome::Copied)
}
