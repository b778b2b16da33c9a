//! Import ledger
//!
//! Persisted record of every file the organizer has decided on. A record is
//! either a real import (storage path of a file on disk) or a suppression
//! (artist, title and storage path all carry a bracketed reason tag).
//!
//! Records are append-only; the only deletion is [`ImportLedger::cleanup_bulk`].

use crate::scanner::{is_audio_file, ScanError, SourceScanner};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tunesort_common::normalize::nfc_lower;
use tunesort_common::{Error, Result};

const SELECT_COLUMNS: &str =
    "SELECT id, original_name, ai_artist, ai_title, storage_path, date_added FROM import_ledger";

/// Why a file was suppressed instead of imported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SuppressionReason {
    /// Same title already present in the artist's destination directory
    Duplicate,
    /// Not an audio file
    NotAudio,
    /// No artist/title could be determined; copied to the unsorted area
    NoMetadata,
    /// Destination name taken by a different track
    DestinationExists,
    /// Frozen by bulk seeding (audio file)
    BulkImportAudio,
    /// Frozen by bulk seeding (any other file)
    BulkImportNonAudio,
}

impl SuppressionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SuppressionReason::Duplicate => "duplicate",
            SuppressionReason::NotAudio => "not_audio",
            SuppressionReason::NoMetadata => "no_metadata",
            SuppressionReason::DestinationExists => "destination_exists",
            SuppressionReason::BulkImportAudio => "bulk_import_audio",
            SuppressionReason::BulkImportNonAudio => "bulk_import_non_audio",
        }
    }

    /// Bracketed form stored in the ledger, e.g. `[duplicate]`
    pub fn tag(self) -> String {
        format!("[{}]", self.as_str())
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        let inner = tag.strip_prefix('[')?.strip_suffix(']')?;
        [
            SuppressionReason::Duplicate,
            SuppressionReason::NotAudio,
            SuppressionReason::NoMetadata,
            SuppressionReason::DestinationExists,
            SuppressionReason::BulkImportAudio,
            SuppressionReason::BulkImportNonAudio,
        ]
        .into_iter()
        .find(|r| r.as_str() == inner)
    }

    /// Member of the bulk-import family removed by `cleanup_bulk`
    pub fn is_bulk(self) -> bool {
        matches!(
            self,
            SuppressionReason::BulkImportAudio | SuppressionReason::BulkImportNonAudio
        )
    }
}

impl fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_reason_tag(value: &str) -> bool {
    value.starts_with('[') && value.ends_with(']')
}

/// One ledger row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub id: i64,
    pub original_name: String,
    pub ai_artist: String,
    pub ai_title: String,
    pub storage_path: String,
    /// ISO-8601 timestamp
    pub date_added: String,
}

impl ImportRecord {
    fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            original_name: row.get("original_name"),
            ai_artist: row.get("ai_artist"),
            ai_title: row.get("ai_title"),
            storage_path: row.get("storage_path"),
            date_added: row.get("date_added"),
        }
    }

    /// Suppression rows carry a bracketed tag instead of a path
    pub fn is_suppression(&self) -> bool {
        is_reason_tag(&self.storage_path)
    }

    /// Known suppression reason, if this is a suppression row
    pub fn reason(&self) -> Option<SuppressionReason> {
        SuppressionReason::from_tag(&self.storage_path)
    }
}

/// Counts per record kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    /// Real imports
    pub imports: i64,
    /// Suppressions keyed by bracketed tag
    pub suppressions: BTreeMap<String, i64>,
}

impl LedgerStats {
    pub fn total(&self) -> i64 {
        self.imports + self.suppressions.values().sum::<i64>()
    }

    pub fn display_string(&self) -> String {
        let mut parts = vec![format!("{} imports", self.imports)];
        for (tag, count) in &self.suppressions {
            parts.push(format!("{} {}", count, tag));
        }
        parts.join(", ")
    }
}

/// Result of freezing a source tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSeedReport {
    pub seeded_audio: usize,
    pub seeded_non_audio: usize,
    /// Files that already had a ledger entry
    pub already_known: usize,
}

/// Ledger store
///
/// The pool holds a single connection; each operation checks it out and
/// returns it, so no transaction spans more than one call.
#[derive(Clone)]
pub struct ImportLedger {
    pool: SqlitePool,
}

impl ImportLedger {
    /// Open (or create) the ledger database at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::debug!("Connecting to ledger: {}", db_path.display());

        // Path handed over as a file name, never parsed as a URL
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Ledger backed by a private in-memory database
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let ledger = Self { pool };
        ledger.init_tables().await?;
        Ok(ledger)
    }

    async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS import_ledger (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                original_name TEXT NOT NULL,
                ai_artist TEXT NOT NULL,
                ai_title TEXT NOT NULL,
                storage_path TEXT NOT NULL,
                date_added TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_import_ledger_original_name ON import_ledger(original_name)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Close the underlying pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Find a record by original filename
    ///
    /// Tries, in order: literal name, case-insensitive name, then unicode
    /// NFC + lower-case comparison. Returns the oldest hit of the first
    /// strategy that matches.
    pub async fn lookup_exact(&self, original_name: &str) -> Result<Option<ImportRecord>> {
        let literal = sqlx::query(&format!(
            "{} WHERE original_name = ? ORDER BY id LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(original_name)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = literal {
            return Ok(Some(ImportRecord::from_row(&row)));
        }

        let nocase = sqlx::query(&format!(
            "{} WHERE original_name = ? COLLATE NOCASE ORDER BY id LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(original_name)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = nocase {
            tracing::debug!(name = %original_name, "Exact match (case-insensitive)");
            return Ok(Some(ImportRecord::from_row(&row)));
        }

        // SQLite NOCASE only folds ASCII; compare normalized forms in Rust
        let wanted = nfc_lower(original_name);
        let rows = sqlx::query("SELECT id, original_name FROM import_ledger ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let name: String = row.get("original_name");
            if nfc_lower(&name) == wanted {
                let id: i64 = row.get("id");
                tracing::debug!(name = %original_name, matched = %name, "Exact match (unicode-normalized)");
                return self.get(id).await;
            }
        }

        Ok(None)
    }

    /// Find a real import whose artist and title are both similar enough
    ///
    /// Each field is compared independently on lower-cased strings; both
    /// ratios must reach `threshold`. Suppression rows are never candidates.
    pub async fn lookup_fuzzy(
        &self,
        artist: &str,
        title: &str,
        threshold: f64,
    ) -> Result<Option<ImportRecord>> {
        let artist = artist.to_lowercase();
        let title = title.to_lowercase();

        let rows = sqlx::query(&format!(
            "{} WHERE storage_path NOT LIKE '[%]' ORDER BY id",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let record = ImportRecord::from_row(&row);
            let artist_ratio = similarity(&artist, &record.ai_artist.to_lowercase());
            if artist_ratio < threshold {
                continue;
            }
            let title_ratio = similarity(&title, &record.ai_title.to_lowercase());
            if title_ratio >= threshold {
                tracing::debug!(
                    id = record.id,
                    artist_ratio,
                    title_ratio,
                    "Fuzzy ledger match"
                );
                return Ok(Some(record));
            }
        }

        Ok(None)
    }

    /// Record a real import
    ///
    /// `storage_path` must name an existing file.
    pub async fn insert_import(
        &self,
        original_name: &str,
        artist: &str,
        title: &str,
        storage_path: &Path,
    ) -> Result<i64> {
        if !storage_path.is_file() {
            return Err(Error::InvalidInput(format!(
                "Storage path does not exist: {}",
                storage_path.display()
            )));
        }

        self.insert_row(
            original_name,
            artist,
            title,
            &storage_path.to_string_lossy(),
        )
        .await
    }

    /// Record a suppression; artist, title and storage path all carry the tag
    pub async fn insert_suppression(
        &self,
        original_name: &str,
        reason: SuppressionReason,
    ) -> Result<i64> {
        let tag = reason.tag();
        self.insert_row(original_name, &tag, &tag, &tag).await
    }

    async fn insert_row(
        &self,
        original_name: &str,
        artist: &str,
        title: &str,
        storage_path: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO import_ledger (original_name, ai_artist, ai_title, storage_path, date_added)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(original_name)
        .bind(artist)
        .bind(title)
        .bind(storage_path)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        tracing::debug!(id, name = %original_name, storage = %storage_path, "Ledger entry added");
        Ok(id)
    }

    /// Load one record by id
    pub async fn get(&self, id: i64) -> Result<Option<ImportRecord>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(ImportRecord::from_row))
    }

    /// Load every record in insertion order
    pub async fn all(&self) -> Result<Vec<ImportRecord>> {
        let rows = sqlx::query(&format!("{} ORDER BY id", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(ImportRecord::from_row).collect())
    }

    /// Count all records
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM import_ledger")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Records whose artist or title contains `term` (case-insensitive for ASCII)
    pub async fn search(&self, term: &str) -> Result<Vec<ImportRecord>> {
        let pattern = format!("%{}%", escape_like(term));
        let rows = sqlx::query(&format!(
            "{} WHERE ai_artist LIKE ?1 ESCAPE '\\' OR ai_title LIKE ?1 ESCAPE '\\' ORDER BY id",
            SELECT_COLUMNS
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(ImportRecord::from_row).collect())
    }

    /// Delete one record so its file is processed again on the next run
    ///
    /// Returns false when no record has that id.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM import_ledger WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            tracing::info!(id, "Ledger entry removed");
        }
        Ok(removed)
    }

    /// Freeze a source tree against future processing
    ///
    /// Every file without an exact ledger match gets a bulk suppression,
    /// audio or non-audio by file type. No metadata is read.
    pub async fn bulk_seed(
        &self,
        scanner: &SourceScanner,
        source_root: &Path,
    ) -> Result<BulkSeedReport> {
        let files = scanner.scan(source_root).map_err(|e| match e {
            ScanError::PathNotFound(p) => Error::NotFound(p.display().to_string()),
            ScanError::NotADirectory(p) => {
                Error::InvalidInput(format!("Not a directory: {}", p.display()))
            }
        })?;

        let mut report = BulkSeedReport::default();
        for file in files {
            let Some(name) = file.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };

            if self.lookup_exact(&name).await?.is_some() {
                report.already_known += 1;
                continue;
            }

            if is_audio_file(&file) {
                self.insert_suppression(&name, SuppressionReason::BulkImportAudio)
                    .await?;
                report.seeded_audio += 1;
            } else {
                self.insert_suppression(&name, SuppressionReason::BulkImportNonAudio)
                    .await?;
                report.seeded_non_audio += 1;
            }
        }

        tracing::info!(
            audio = report.seeded_audio,
            non_audio = report.seeded_non_audio,
            already_known = report.already_known,
            "Bulk seed complete"
        );

        Ok(report)
    }

    /// Delete bulk-import suppressions; returns the number removed
    pub async fn cleanup_bulk(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM import_ledger WHERE storage_path IN (?, ?)")
            .bind(SuppressionReason::BulkImportAudio.tag())
            .bind(SuppressionReason::BulkImportNonAudio.tag())
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        tracing::info!(removed, "Bulk suppressions removed");
        Ok(removed)
    }

    /// Count imports and suppressions per tag
    pub async fn stats(&self) -> Result<LedgerStats> {
        let rows = sqlx::query(
            "SELECT storage_path, COUNT(*) AS n FROM import_ledger \
             WHERE storage_path LIKE '[%]' GROUP BY storage_path",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = LedgerStats::default();
        for row in rows {
            stats
                .suppressions
                .insert(row.get("storage_path"), row.get("n"));
        }

        stats.imports = sqlx::query_scalar(
            "SELECT COUNT(*) FROM import_ledger WHERE storage_path NOT LIKE '[%]'",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Similarity ratio in `0.0..=1.0`
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"audio").unwrap();
        path
    }

    #[test]
    fn test_reason_tags() {
        assert_eq!(SuppressionReason::Duplicate.tag(), "[duplicate]");
        assert_eq!(
            SuppressionReason::from_tag("[bulk_import_audio]"),
            Some(SuppressionReason::BulkImportAudio)
        );
        assert_eq!(SuppressionReason::from_tag("duplicate"), None);
        assert_eq!(SuppressionReason::from_tag("[unknown]"), None);
        assert!(SuppressionReason::BulkImportNonAudio.is_bulk());
        assert!(!SuppressionReason::NoMetadata.is_bulk());
    }

    #[tokio::test]
    async fn test_insert_import_requires_existing_file() {
        let ledger = ImportLedger::open_in_memory().await.unwrap();
        let result = ledger
            .insert_import("a.mp3", "Artist", "Title", Path::new("/nonexistent/a.mp3"))
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(ledger.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_suppression_row_shape() {
        let ledger = ImportLedger::open_in_memory().await.unwrap();
        let id = ledger
            .insert_suppression("cover.jpg", SuppressionReason::NotAudio)
            .await
            .unwrap();

        let record = ledger.get(id).await.unwrap().unwrap();
        assert_eq!(record.ai_artist, "[not_audio]");
        assert_eq!(record.ai_title, "[not_audio]");
        assert_eq!(record.storage_path, "[not_audio]");
        assert!(record.is_suppression());
        assert_eq!(record.reason(), Some(SuppressionReason::NotAudio));
        assert!(chrono::DateTime::parse_from_rfc3339(&record.date_added).is_ok());
    }

    #[tokio::test]
    async fn test_lookup_exact_priority() {
        let dir = tempfile::tempdir().unwrap();
        let stored = touch(dir.path(), "stored.mp3");
        let ledger = ImportLedger::open_in_memory().await.unwrap();

        ledger
            .insert_import("Song.MP3", "A", "Song", &stored)
            .await
            .unwrap();
        ledger
            .insert_suppression("song.mp3", SuppressionReason::Duplicate)
            .await
            .unwrap();

        // Literal hit beats the earlier case-insensitive one
        let hit = ledger.lookup_exact("song.mp3").await.unwrap().unwrap();
        assert_eq!(hit.reason(), Some(SuppressionReason::Duplicate));

        // Case-insensitive
        let hit = ledger.lookup_exact("SONG.mp3").await.unwrap().unwrap();
        assert_eq!(hit.original_name, "Song.MP3");

        assert!(ledger.lookup_exact("other.mp3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_exact_unicode_variants() {
        let ledger = ImportLedger::open_in_memory().await.unwrap();
        // Decomposed é stored, precomposed upper-case É looked up
        ledger
            .insert_suppression("Cafe\u{0301}.mp3", SuppressionReason::NoMetadata)
            .await
            .unwrap();

        let hit = ledger.lookup_exact("CAF\u{00c9}.mp3").await.unwrap();
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn test_lookup_fuzzy_requires_both_fields() {
        let dir = tempfile::tempdir().unwrap();
        let stored = touch(dir.path(), "stored.mp3");
        let ledger = ImportLedger::open_in_memory().await.unwrap();
        ledger
            .insert_import(
                "queen.mp3",
                "Queen",
                "Don't Stop Me Now (Remastered 2011)",
                &stored,
            )
            .await
            .unwrap();

        // Case and one punctuation mark: both ratios pass
        let hit = ledger
            .lookup_fuzzy("QUEEN", "Dont Stop Me Now (Remastered 2011)", 0.95)
            .await
            .unwrap();
        assert!(hit.is_some());

        // Title matches, artist does not
        let miss = ledger
            .lookup_fuzzy("Queens of the Stone Age", "Don't Stop Me Now (Remastered 2011)", 0.95)
            .await
            .unwrap();
        assert!(miss.is_none());

        // Artist matches, title does not
        let miss = ledger
            .lookup_fuzzy("Queen", "Bohemian Rhapsody", 0.95)
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_lookup_fuzzy_ignores_suppressions() {
        let ledger = ImportLedger::open_in_memory().await.unwrap();
        ledger
            .insert_suppression("x.mp3", SuppressionReason::Duplicate)
            .await
            .unwrap();

        let hit = ledger
            .lookup_fuzzy("[duplicate]", "[duplicate]", 0.95)
            .await
            .unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_stats() {
        let dir = tempfile::tempdir().unwrap();
        let stored = touch(dir.path(), "stored.mp3");
        let ledger = ImportLedger::open_in_memory().await.unwrap();
        ledger.insert_import("a.mp3", "A", "T", &stored).await.unwrap();
        ledger
            .insert_suppression("b.mp3", SuppressionReason::Duplicate)
            .await
            .unwrap();
        ledger
            .insert_suppression("c.mp3", SuppressionReason::Duplicate)
            .await
            .unwrap();

        let stats = ledger.stats().await.unwrap();
        assert_eq!(stats.imports, 1);
        assert_eq!(stats.suppressions.get("[duplicate]"), Some(&2));
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.display_string(), "1 imports, 2 [duplicate]");
    }

    #[tokio::test]
    async fn test_search_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let stored = touch(dir.path(), "stored.mp3");
        let ledger = ImportLedger::open_in_memory().await.unwrap();
        let queen = ledger
            .insert_import("a.mp3", "Queen", "Bohemian Rhapsody", &stored)
            .await
            .unwrap();
        ledger
            .insert_import("b.mp3", "ACRAZE", "Do It To It", &stored)
            .await
            .unwrap();
        ledger
            .insert_suppression("c.mp3", SuppressionReason::NoMetadata)
            .await
            .unwrap();

        let hits = ledger.search("rhapsody").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, queen);

        // LIKE wildcards in the term are literal
        assert!(ledger.search("%").await.unwrap().is_empty());
        assert_eq!(ledger.search("no_metadata").await.unwrap().len(), 1);

        assert!(ledger.delete(queen).await.unwrap());
        assert!(!ledger.delete(queen).await.unwrap());
        assert!(ledger.lookup_exact("a.mp3").await.unwrap().is_none());
        assert_eq!(ledger.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("ledger.db");

        let ledger = ImportLedger::open(&db_path).await.unwrap();
        ledger
            .insert_suppression("a.txt", SuppressionReason::NotAudio)
            .await
            .unwrap();
        ledger.close().await;

        let reopened = ImportLedger::open(&db_path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_open_path_with_url_characters() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("mixes?#50%").join("ledger.db");

        let ledger = ImportLedger::open(&db_path).await.unwrap();
        ledger
            .insert_suppression("a.txt", SuppressionReason::NotAudio)
            .await
            .unwrap();
        ledger.close().await;

        assert!(db_path.is_file());
        let reopened = ImportLedger::open(&db_path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }
}
