//! In-memory stand-ins for tag I/O and normalization services

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tunesort_ingest::{
    EmbeddedTags, NormalizationService, NormalizeRequest, NormalizeResponse, ServiceError, TagError,
    TagIo, TagWriteReport,
};

/// One recorded tag rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagWrite {
    pub path: PathBuf,
    pub artists: Vec<String>,
    pub title: String,
}

/// Tag I/O keyed by file name
///
/// Files without an entry read as unreadable. Opus/FLAC/Ogg/MP3/WAV
/// destinations accept a collaborator list; everything else is single-artist.
#[derive(Default)]
pub struct FakeTagIo {
    tags: Mutex<HashMap<String, EmbeddedTags>>,
    writes: Mutex<Vec<TagWrite>>,
    fail_writes: bool,
}

impl FakeTagIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write fails
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    pub fn set(&self, file_name: &str, artist: Option<&str>, title: Option<&str>) {
        let tags = EmbeddedTags {
            artist: artist.map(str::to_string),
            title: title.map(str::to_string),
            ..Default::default()
        };
        self.tags.lock().unwrap().insert(file_name.to_string(), tags);
    }

    pub fn writes(&self) -> Vec<TagWrite> {
        self.writes.lock().unwrap().clone()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl TagIo for FakeTagIo {
    fn read(&self, path: &Path) -> Result<EmbeddedTags, TagError> {
        let name = file_name(path);
        self.tags
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .ok_or(TagError::Read(name))
    }

    fn write_artist_title(
        &self,
        path: &Path,
        artists: &[String],
        title: &str,
    ) -> Result<TagWriteReport, TagError> {
        if self.fail_writes {
            return Err(TagError::Write(format!("read-only: {}", path.display())));
        }

        self.writes.lock().unwrap().push(TagWrite {
            path: path.to_path_buf(),
            artists: artists.to_vec(),
            title: title.to_string(),
        });

        let tag_type = match path.extension().and_then(|e| e.to_str()) {
            Some("opus" | "flac" | "ogg") => "VorbisComments",
            Some("mp3" | "wav") => "Id3v2",
            _ => "Mp4Ilst",
        };
        let multi_artist = tag_type != "Mp4Ilst";
        Ok(TagWriteReport {
            tag_type: tag_type.to_string(),
            multi_artist,
            unsupported_collaborators: if multi_artist {
                Vec::new()
            } else {
                artists.iter().skip(1).cloned().collect()
            },
        })
    }
}

enum Script {
    /// Replies by request file name; unknown names get "no decision"
    ByFilename(HashMap<String, NormalizeResponse>),
    /// Replies in call order
    Sequence(Mutex<VecDeque<Result<NormalizeResponse, ServiceError>>>),
    /// Never answers
    Hang,
}

/// Normalization service with canned replies and a call counter
pub struct ScriptedService {
    name: String,
    script: Script,
    calls: Arc<AtomicUsize>,
}

impl ScriptedService {
    pub fn by_filename(name: &str, replies: Vec<(&str, NormalizeResponse)>) -> Self {
        let map = replies
            .into_iter()
            .map(|(file, reply)| (file.to_string(), reply))
            .collect();
        Self::with_script(name, Script::ByFilename(map))
    }

    pub fn sequence(name: &str, replies: Vec<Result<NormalizeResponse, ServiceError>>) -> Self {
        Self::with_script(name, Script::Sequence(Mutex::new(replies.into())))
    }

    pub fn hanging(name: &str) -> Self {
        Self::with_script(name, Script::Hang)
    }

    fn with_script(name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            script,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared handle on the call counter
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    /// Chain entry with a generous timeout
    pub fn entry(self) -> (Arc<dyn NormalizationService>, Duration) {
        (Arc::new(self), Duration::from_secs(5))
    }

    pub fn entry_with_timeout(self, timeout: Duration) -> (Arc<dyn NormalizationService>, Duration) {
        (Arc::new(self), timeout)
    }
}

fn no_decision() -> NormalizeResponse {
    NormalizeResponse {
        use_as_is: false,
        artist: None,
        artists: None,
        title: None,
    }
}

#[async_trait]
impl NormalizationService for ScriptedService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn normalize(&self, request: &NormalizeRequest) -> Result<NormalizeResponse, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::ByFilename(map) => Ok(map.get(&request.filename).cloned().unwrap_or_else(no_decision)),
            Script::Sequence(replies) => replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(no_decision())),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(no_decision())
            }
        }
    }
}
