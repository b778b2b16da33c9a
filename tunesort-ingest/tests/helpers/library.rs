//! Temporary source/destination trees

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tunesort_ingest::{
    ImportLedger, IngestConfig, MetadataResolver, OrganizePipeline, RunMode, TagIo,
};

/// Source and destination trees under one temp dir
pub struct Library {
    _dir: TempDir,
    pub source: PathBuf,
    pub dest: PathBuf,
}

impl Library {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("incoming");
        let dest = dir.path().join("library");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&dest).unwrap();
        Self {
            _dir: dir,
            source,
            dest,
        }
    }

    /// Write a source file (parent directories included); content is its name
    pub fn add(&self, relative: &str) -> PathBuf {
        let path = self.source.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, relative.as_bytes()).unwrap();
        path
    }

    /// Write a file directly into the destination tree
    pub fn add_existing(&self, relative: &str) -> PathBuf {
        let path = self.dest.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"existing").unwrap();
        path
    }

    pub fn config(&self) -> IngestConfig {
        IngestConfig::new(&self.source, &self.dest)
    }

    pub fn pipeline(
        &self,
        mode: RunMode,
        ledger: &ImportLedger,
        resolver: MetadataResolver,
        tag_io: Arc<dyn TagIo>,
    ) -> OrganizePipeline {
        OrganizePipeline::new(self.config(), mode, ledger.clone(), resolver, tag_io)
    }

    /// Every regular file under the destination, relative and sorted
    pub fn dest_files(&self) -> Vec<String> {
        let mut files = Vec::new();
        collect_files(&self.dest, &self.dest, &mut files);
        files.sort();
        files
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect_files(root, &path, out);
        } else {
            out.push(path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"));
        }
    }
}
