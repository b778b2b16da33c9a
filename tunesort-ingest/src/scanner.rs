//! Source tree scanner
//!
//! Recursive file discovery plus audio typing. Unlike a library scan, every
//! regular file is returned: non-audio files still need a ledger decision.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Extensions accepted as audio without sniffing
const AUDIO_EXTENSIONS: [&str; 15] = [
    "mp3", "flac", "ogg", "oga", "opus", "m4a", "aac", "mp4", "wav", "aiff", "aif", "wma", "wv",
    "ape", "alac",
];

/// Source scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Check if a file is audio
///
/// Extension first (fast); unknown extensions fall back to magic-byte sniffing.
pub fn is_audio_file(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        let ext_lower = ext.to_string_lossy().to_lowercase();
        if AUDIO_EXTENSIONS.contains(&ext_lower.as_str()) {
            return true;
        }
    }

    match infer::get_from_path(path) {
        Ok(Some(kind)) => kind.matcher_type() == infer::MatcherType::Audio,
        Ok(None) => false,
        Err(e) => {
            tracing::debug!("Could not sniff {}: {}", path.display(), e);
            false
        }
    }
}

/// Lower-cased extension including the leading dot, or empty
pub fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Source tree scanner
pub struct SourceScanner {
    ignore_patterns: Vec<String>,
    excluded: Vec<PathBuf>,
}

impl SourceScanner {
    /// Create scanner with default ignore patterns
    ///
    /// Ignores system files like .DS_Store, Thumbs.db, .git, etc.
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
            ],
            excluded: Vec::new(),
        }
    }

    /// Never descend into `path` (e.g. a destination tree nested in the source)
    pub fn exclude(mut self, path: &Path) -> Self {
        self.excluded
            .push(path.canonicalize().unwrap_or_else(|_| path.to_path_buf()));
        self
    }

    /// List every regular file under `root_path`, sorted by path
    pub fn scan(&self, root_path: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root_path.exists() {
            return Err(ScanError::PathNotFound(root_path.to_path_buf()));
        }

        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory(root_path.to_path_buf()));
        }

        let mut files = Vec::new();
        let mut symlink_visited = HashSet::new();

        let walker = WalkDir::new(root_path)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() {
                        files.push(entry.into_path());
                    }
                }
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }

        tracing::debug!("Scan complete: {} files under {}", files.len(), root_path.display());

        Ok(files)
    }

    /// Check if entry should be processed
    fn should_process_entry(&self, entry: &DirEntry, symlink_visited: &mut HashSet<PathBuf>) -> bool {
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy();

        if self.ignore_patterns.iter().any(|p| file_name.contains(p.as_str())) {
            return false;
        }

        if entry.file_type().is_dir() && !self.excluded.is_empty() {
            let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
            if self.excluded.iter().any(|ex| canonical.starts_with(ex)) {
                tracing::debug!("Skipping excluded directory: {}", path.display());
                return false;
            }
        }

        if entry.file_type().is_symlink() {
            if let Ok(canonical) = path.canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!("Symlink loop detected: {}", path.display());
                    return false;
                }
            }
        }

        true
    }
}

impl Default for SourceScanner {
    fn default() -> Self {
        Self::new()
    }
}
