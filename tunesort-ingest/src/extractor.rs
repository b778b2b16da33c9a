//! Audio metadata extraction
//!
//! Extracts title, artist, album and date from the tags natively present in
//! a file. Never fails outward: an unreadable container yields an empty mapping.

use crate::tags::{EmbeddedTags, LoftyTagIo, TagIo};
use std::path::Path;
use std::sync::Arc;

/// Metadata extractor service
#[derive(Clone)]
pub struct MetadataExtractor {
    tag_io: Arc<dyn TagIo>,
}

impl MetadataExtractor {
    /// Create extractor over the given tag reader
    pub fn new(tag_io: Arc<dyn TagIo>) -> Self {
        Self { tag_io }
    }

    /// Extract embedded fields from an audio file
    ///
    /// Side-effect free. Corrupt or unsupported containers are logged and
    /// produce `EmbeddedTags::default()`.
    pub fn extract(&self, file_path: &Path) -> EmbeddedTags {
        match self.tag_io.read(file_path) {
            Ok(tags) => {
                tracing::debug!(
                    file = %file_path.display(),
                    artist = ?tags.artist,
                    title = ?tags.title,
                    album = ?tags.album,
                    date = ?tags.date,
                    "Extracted metadata"
                );
                tags
            }
            Err(e) => {
                tracing::debug!(
                    file = %file_path.display(),
                    error = %e,
                    "Metadata extraction failed, continuing without tags"
                );
                EmbeddedTags::default()
            }
        }
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new(Arc::new(LoftyTagIo::new()))
    }
}
