//! Embedded tag I/O
//!
//! Reading and writing of artist/title fields inside audio containers, via `lofty`.
//! The [`TagIo`] trait is the seam the pipeline depends on; [`LoftyTagIo`] is the
//! production implementation.

use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::id3::v2::Id3v2Tag;
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, ItemValue, Tag, TagExt, TagItem, TagType};
use std::borrow::Cow;
use std::path::Path;
use thiserror::Error;

/// Vorbis/APE field, and ID3v2 `TXXX` description, holding the full collaborator list
const ARTISTS_FIELD: &str = "ARTISTS";

/// Joins the collaborator list inside the single ID3v2 `TXXX:ARTISTS` frame
const ID3V2_ARTISTS_SEPARATOR: &str = "; ";

/// Tag I/O errors
#[derive(Debug, Error)]
pub enum TagError {
    /// Container could not be opened or parsed
    #[error("Failed to read tags: {0}")]
    Read(String),

    /// Tags could not be saved back to the container
    #[error("Failed to write tags: {0}")]
    Write(String),

    /// Container does not accept a tag of any kind
    #[error("No writable tag in {0}")]
    NoTag(String),
}

/// Fields natively present in a container's tags
///
/// Blank values are normalized to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddedTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Recording date, or the year when only that is present
    pub date: Option<String>,
}

impl EmbeddedTags {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.artist.is_none() && self.album.is_none() && self.date.is_none()
    }

    /// Both artist and title are present
    pub fn artist_and_title(&self) -> Option<(&str, &str)> {
        match (self.artist.as_deref(), self.title.as_deref()) {
            (Some(artist), Some(title)) => Some((artist, title)),
            _ => None,
        }
    }
}

/// What a successful tag rewrite did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagWriteReport {
    /// Tag format that received the fields
    pub tag_type: String,
    /// Whether the collaborator list was stored in its own field
    pub multi_artist: bool,
    /// Collaborators the container had no room for
    pub unsupported_collaborators: Vec<String>,
}

/// Read/write access to embedded tags
pub trait TagIo: Send + Sync {
    /// Read the natively present fields
    fn read(&self, path: &Path) -> Result<EmbeddedTags, TagError>;

    /// Rewrite artist/title
    ///
    /// `artists[0]` is the primary artist. The full list goes into a separate
    /// field when the container supports one.
    fn write_artist_title(
        &self,
        path: &Path,
        artists: &[String],
        title: &str,
    ) -> Result<TagWriteReport, TagError>;
}

/// `lofty`-backed tag I/O
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagIo;

impl LoftyTagIo {
    pub fn new() -> Self {
        Self
    }
}

/// Tags with a free-form field for the full collaborator list
fn supports_multiple_artists(tag_type: TagType) -> bool {
    matches!(tag_type, TagType::VorbisComments | TagType::Ape | TagType::Id3v2)
}

fn non_blank(value: Option<Cow<'_, str>>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TagIo for LoftyTagIo {
    fn read(&self, path: &Path) -> Result<EmbeddedTags, TagError> {
        let tagged_file = Probe::open(path)
            .map_err(|e| TagError::Read(e.to_string()))?
            .read()
            .map_err(|e| TagError::Read(e.to_string()))?;

        let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            return Ok(EmbeddedTags::default());
        };

        let date = tag
            .get_string(&ItemKey::RecordingDate)
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .or_else(|| tag.year().map(|y| y.to_string()));

        Ok(EmbeddedTags {
            title: non_blank(tag.title()),
            artist: non_blank(tag.artist()),
            album: non_blank(tag.album()),
            date,
        })
    }

    fn write_artist_title(
        &self,
        path: &Path,
        artists: &[String],
        title: &str,
    ) -> Result<TagWriteReport, TagError> {
        let Some(primary) = artists.first() else {
            return Err(TagError::Write("no artist to write".to_string()));
        };

        let mut tagged_file = Probe::open(path)
            .map_err(|e| TagError::Read(e.to_string()))?
            .read()
            .map_err(|e| TagError::Read(e.to_string()))?;

        let tag_type = tagged_file.primary_tag_type();
        if tagged_file.primary_tag().is_none() {
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged_file
            .primary_tag_mut()
            .ok_or_else(|| TagError::NoTag(path.display().to_string()))?;

        tag.set_title(title.to_string());
        tag.set_artist(primary.clone());

        let multi_artist = supports_multiple_artists(tag_type);
        let mut id3v2_tag = None;
        match tag_type {
            TagType::Id3v2 => id3v2_tag = Some(tag.clone()),
            _ if multi_artist => {
                let key = ItemKey::Unknown(ARTISTS_FIELD.to_string());
                tag.remove_key(&key);
                for artist in artists {
                    tag.push(TagItem::new(key.clone(), ItemValue::Text(artist.clone())));
                }
            }
            _ => {}
        }
        let unsupported_collaborators = if multi_artist {
            Vec::new()
        } else {
            artists[1..].to_vec()
        };

        tagged_file
            .save_to_path(path, WriteOptions::default())
            .map_err(|e| TagError::Write(e.to_string()))?;

        // The generic tag has no TXXX mapping, so the frame goes through the concrete tag
        if let Some(tag) = id3v2_tag {
            let mut id3v2 = Id3v2Tag::from(tag);
            id3v2.insert_user_text(
                ARTISTS_FIELD.to_string(),
                artists.join(ID3V2_ARTISTS_SEPARATOR),
            );
            id3v2
                .save_to_path(path, WriteOptions::default())
                .map_err(|e| TagError::Write(e.to_string()))?;
        }

        Ok(TagWriteReport {
            tag_type: format!("{:?}", tag_type),
            multi_artist,
            unsupported_collaborators,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use lofty::config::ParseOptions;
    use lofty::iff::wav::WavFile;

    /// Short silent WAV carrying an ID3v2 tag
    fn write_tagged_wav(path: &Path, artist: &str, title: &str) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for _ in 0..800 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let mut tagged_file = Probe::open(path).unwrap().read().unwrap();
        let mut tag = Id3v2Tag::default();
        tag.set_artist(artist.to_string());
        tag.set_title(title.to_string());
        tag.set_album("Singles".to_string());
        tagged_file.insert_tag(tag.into());
        tagged_file.save_to_path(path, WriteOptions::default()).unwrap();
    }

    #[test]
    fn test_read_embedded_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wav");
        write_tagged_wav(&path, "ACRAZE", "Do It To It");

        let tags = LoftyTagIo::new().read(&path).unwrap();
        assert_eq!(tags.artist.as_deref(), Some("ACRAZE"));
        assert_eq!(tags.title.as_deref(), Some("Do It To It"));
        assert_eq!(tags.album.as_deref(), Some("Singles"));
        assert_eq!(tags.artist_and_title(), Some(("ACRAZE", "Do It To It")));
    }

    #[test]
    fn test_read_unparseable_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        std::fs::write(&path, b"not really an mp3").unwrap();

        assert!(LoftyTagIo::new().read(&path).is_err());
    }

    fn read_wav_id3v2(path: &Path) -> Id3v2Tag {
        let mut file = std::fs::File::open(path).unwrap();
        let wav = WavFile::read_from(&mut file, ParseOptions::new()).unwrap();
        wav.id3v2().cloned().unwrap()
    }

    #[test]
    fn test_write_id3v2_stores_collaborators_in_user_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wav");
        write_tagged_wav(&path, "art", "belgisches viertel");

        let artists = vec!["23HOURS".to_string(), "FRIO".to_string(), "EDDY".to_string()];
        let report = LoftyTagIo::new()
            .write_artist_title(&path, &artists, "Belgisches Viertel")
            .unwrap();

        assert_eq!(report.tag_type, "Id3v2");
        assert!(report.multi_artist);
        assert!(report.unsupported_collaborators.is_empty());

        let tags = LoftyTagIo::new().read(&path).unwrap();
        assert_eq!(tags.artist.as_deref(), Some("23HOURS"));
        assert_eq!(tags.title.as_deref(), Some("Belgisches Viertel"));
        assert_eq!(tags.album.as_deref(), Some("Singles"));

        let id3v2 = read_wav_id3v2(&path);
        assert_eq!(id3v2.get_user_text("ARTISTS"), Some("23HOURS; FRIO; EDDY"));
    }

    #[test]
    fn test_rewrite_replaces_collaborator_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wav");
        write_tagged_wav(&path, "a", "b");

        let io = LoftyTagIo::new();
        let first = vec!["Daft Punk".to_string(), "Pharrell Williams".to_string()];
        io.write_artist_title(&path, &first, "Get Lucky").unwrap();
        io.write_artist_title(&path, &["Daft Punk".to_string()], "Get Lucky")
            .unwrap();

        let id3v2 = read_wav_id3v2(&path);
        assert_eq!(id3v2.get_user_text("ARTISTS"), Some("Daft Punk"));
    }

    #[test]
    fn test_single_field_tags() {
        assert!(supports_multiple_artists(TagType::VorbisComments));
        assert!(supports_multiple_artists(TagType::Ape));
        assert!(supports_multiple_artists(TagType::Id3v2));
        assert!(!supports_multiple_artists(TagType::Mp4Ilst));
        assert!(!supports_multiple_artists(TagType::RiffInfo));
        assert!(!supports_multiple_artists(TagType::Id3v1));
    }

    #[test]
    fn test_write_without_artist_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wav");
        write_tagged_wav(&path, "a", "b");

        assert!(LoftyTagIo::new().write_artist_title(&path, &[], "b").is_err());
    }

    #[test]
    fn test_embedded_tags_helpers() {
        let mut tags = EmbeddedTags::default();
        assert!(tags.is_empty());
        assert_eq!(tags.artist_and_title(), None);

        tags.artist = Some("Artist".to_string());
        assert!(!tags.is_empty());
        assert_eq!(tags.artist_and_title(), None);
    }
}
