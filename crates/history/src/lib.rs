use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use common::{CanonicalRecord, HistorySnapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

mod run;

pub use run::{select_entries, write_entries, CatalogRun, RunSummary, TrackOutcome};

const BATCH_EXT: &str = "jsonl";

/// Fields that are derived or assigned and therefore never decide whether a
/// record is a new version.
const NON_IDENTITY_FIELDS: &[&str] = &["search_key", "revision"];

/// What `load` does with a batch file that fails to parse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptBatchPolicy {
    #[default]
    Abort,
    Skip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub is_new: bool,
    pub revision: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub tracks: usize,
    pub snapshots: usize,
    pub batches: usize,
    pub pending: usize,
}

/// Version history of every track, loaded from a directory of immutable
/// batch files. New versions accumulate in memory and are written as one
/// new batch by [`VersionStore::flush`].
#[derive(Debug)]
pub struct VersionStore {
    dir: PathBuf,
    index: HashMap<String, Vec<HistorySnapshot>>,
    pending: Vec<CanonicalRecord>,
    batches: Vec<String>,
    flushed: bool,
}

impl VersionStore {
    pub fn load(dir: impl Into<PathBuf>, policy: CorruptBatchPolicy) -> Result<Self, HistoryError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut store = Self {
            dir,
            index: HashMap::new(),
            pending: Vec::new(),
            batches: Vec::new(),
            flushed: false,
        };

        let files = batch_files(&store.dir)?;
        if files.is_empty() {
            info!("No history batches in {:?}; starting fresh", store.dir);
            return Ok(store);
        }

        info!("Loading {} history batches from {:?}", files.len(), store.dir);
        for file in files {
            match read_batch(&file) {
                Ok(records) => {
                    debug!("Loaded {} snapshots from {:?}", records.len(), file);
                    store.merge(records, &file);
                    store.batches.push(batch_stem(&file));
                }
                Err(err @ HistoryError::CorruptBatch { .. }) => match policy {
                    CorruptBatchPolicy::Abort => return Err(err),
                    CorruptBatchPolicy::Skip => {
                        warn!("Skipping corrupt history batch: {}", err);
                    }
                },
                Err(err) => return Err(err),
            }
        }

        Ok(store)
    }

    /// Decides whether `record` matches a stored version of its track.
    ///
    /// A match returns that version's revision. Otherwise the record is new
    /// and gets one more than the number of versions already known, so
    /// revisions stay dense as long as history is never pruned.
    pub fn resolve(&self, record: &CanonicalRecord) -> Result<Resolution, HistoryError> {
        let id = record.id.as_deref().ok_or(HistoryError::IdentityMissing)?;
        let key = comparison_key(record);
        let snapshots = self.history(id);

        for snapshot in snapshots {
            if comparison_key(&snapshot.record) == key {
                return Ok(Resolution {
                    is_new: false,
                    revision: snapshot.revision,
                });
            }
        }

        Ok(Resolution {
            is_new: true,
            revision: next_revision(snapshots),
        })
    }

    /// Queues a new version for the next flush. The record must carry the
    /// revision `resolve` assigned it.
    pub fn append(&mut self, record: CanonicalRecord) -> Result<(), HistoryError> {
        if self.flushed {
            return Err(HistoryError::AlreadyFlushed);
        }
        let id = record.id.clone().ok_or(HistoryError::IdentityMissing)?;
        let expected = next_revision(self.history(&id));
        let revision = match record.revision {
            Some(revision) if revision == expected => revision,
            found => {
                return Err(HistoryError::RevisionConflict {
                    id,
                    expected,
                    found,
                })
            }
        };

        self.index.entry(id).or_default().push(HistorySnapshot {
            revision,
            record: record.clone(),
        });
        self.pending.push(record);
        Ok(())
    }

    /// Writes pending versions as batch `batch_name`. Returns `false` without
    /// touching the directory when nothing is pending.
    pub fn flush(&mut self, batch_name: &str) -> Result<bool, HistoryError> {
        if self.flushed {
            return Err(HistoryError::AlreadyFlushed);
        }
        if self.pending.is_empty() {
            info!("No new versions; history unchanged");
            return Ok(false);
        }
        if batch_name.is_empty()
            || batch_name.starts_with('.')
            || batch_name.contains(&['/', '\\'][..])
        {
            return Err(HistoryError::InvalidBatchName(batch_name.to_string()));
        }

        let path = self.batch_path(batch_name);
        if path.exists() {
            return Err(HistoryError::BatchExists(path));
        }

        let mut contents = String::new();
        for record in &self.pending {
            contents.push_str(&serde_json::to_string(record)?);
            contents.push('\n');
        }

        let tmp_path = self.dir.join(format!(".{}.{}.tmp", batch_name, BATCH_EXT));
        if let Err(err) = write_synced(&tmp_path, contents.as_bytes())
            .and_then(|_| fs::rename(&tmp_path, &path))
        {
            let _ = fs::remove_file(&tmp_path);
            return Err(err.into());
        }

        info!("Saved {} new versions to {:?}", self.pending.len(), path);
        self.pending.clear();
        self.batches.push(batch_name.to_string());
        self.flushed = true;
        Ok(true)
    }

    /// Stored versions of `id`, oldest batch first. Includes versions
    /// appended during this run.
    pub fn history(&self, id: &str) -> &[HistorySnapshot] {
        self.index.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pending(&self) -> &[CanonicalRecord] {
        &self.pending
    }

    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            tracks: self.index.len(),
            snapshots: self.index.values().map(Vec::len).sum(),
            batches: self.batches.len(),
            pending: self.pending.len(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `base` if no batch by that name exists yet, otherwise the first free
    /// `base-2`, `base-3`, ...
    pub fn next_batch_name(&self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut suffix = 1;
        while self.batch_path(&candidate).exists() {
            suffix += 1;
            candidate = format!("{}-{}", base, suffix);
        }
        candidate
    }

    fn batch_path(&self, batch_name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", batch_name, BATCH_EXT))
    }

    fn merge(&mut self, records: Vec<CanonicalRecord>, file: &Path) {
        for record in records {
            let id = match record.id.clone() {
                Some(id) => id,
                None => {
                    warn!("Ignoring snapshot without id in {:?}", file);
                    continue;
                }
            };
            let snapshots = self.index.entry(id).or_default();
            let revision = match record.revision {
                Some(revision) => revision,
                None => next_revision(snapshots),
            };
            snapshots.push(HistorySnapshot { revision, record });
        }
    }
}

/// Sortable batch name for a run started at `at`: `YYYY-MM-DD@HH:MM:SS`.
/// Older minute-resolution names still sort before any name from the same
/// minute.
pub fn batch_name(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d@%H:%M:%S").to_string()
}

#[derive(Debug)]
pub enum HistoryError {
    Io(io::Error),
    Json(serde_json::Error),
    CorruptBatch {
        file: PathBuf,
        line: usize,
        message: String,
    },
    IdentityMissing,
    RevisionConflict {
        id: String,
        expected: u32,
        found: Option<u32>,
    },
    BatchExists(PathBuf),
    InvalidBatchName(String),
    AlreadyFlushed,
}

impl std::fmt::Display for HistoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistoryError::Io(err) => write!(f, "io error: {}", err),
            HistoryError::Json(err) => write!(f, "json error: {}", err),
            HistoryError::CorruptBatch {
                file,
                line,
                message,
            } => write!(f, "corrupt batch {:?} at line {}: {}", file, line, message),
            HistoryError::IdentityMissing => write!(f, "record has no id"),
            HistoryError::RevisionConflict {
                id,
                expected,
                found,
            } => write!(
                f,
                "revision conflict for {}: expected {}, got {:?}",
                id, expected, found
            ),
            HistoryError::BatchExists(path) => write!(f, "batch already exists: {:?}", path),
            HistoryError::InvalidBatchName(name) => write!(f, "invalid batch name: {:?}", name),
            HistoryError::AlreadyFlushed => write!(f, "history already flushed for this run"),
        }
    }
}

impl std::error::Error for HistoryError {}

impl From<io::Error> for HistoryError {
    fn from(err: io::Error) -> Self {
        HistoryError::Io(err)
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(err: serde_json::Error) -> Self {
        HistoryError::Json(err)
    }
}

impl From<walkdir::Error> for HistoryError {
    fn from(err: walkdir::Error) -> Self {
        HistoryError::Io(err.into())
    }
}

/// Present fields that take part in version identity, stringified.
fn comparison_key(record: &CanonicalRecord) -> BTreeMap<&'static str, String> {
    record
        .fields()
        .into_iter()
        .filter(|(name, _)| !NON_IDENTITY_FIELDS.contains(name))
        .collect()
}

fn next_revision(snapshots: &[HistorySnapshot]) -> u32 {
    u32::try_from(snapshots.len())
        .unwrap_or(u32::MAX)
        .saturating_add(1)
}

fn batch_files(dir: &Path) -> Result<Vec<PathBuf>, HistoryError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        let is_batch = path
            .extension()
            .map(|ext| ext == BATCH_EXT)
            .unwrap_or(false);
        if is_batch && !hidden {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

fn read_batch(path: &Path) -> Result<Vec<CanonicalRecord>, HistoryError> {
    let corrupt = |line: usize, message: String| HistoryError::CorruptBatch {
        file: path.to_path_buf(),
        line,
        message,
    };

    let bytes = fs::read(path)?;
    let text = String::from_utf8(bytes).map_err(|err| corrupt(0, err.to_string()))?;
    if !text.is_empty() && !text.ends_with('\n') {
        let last_line = text.lines().count();
        return Err(corrupt(last_line, "truncated batch".to_string()));
    }

    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: CanonicalRecord =
            serde_json::from_str(trimmed).map_err(|err| corrupt(idx + 1, err.to_string()))?;
        if record.revision == Some(0) {
            return Err(corrupt(idx + 1, "revision 0".to_string()));
        }
        records.push(record);
    }
    Ok(records)
}

fn write_synced(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

fn batch_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use common::CanonicalRecord;
    use tempfile::TempDir;

    use super::{batch_name, CorruptBatchPolicy, HistoryError, Resolution, VersionStore};

    fn wavy() -> CanonicalRecord {
        CanonicalRecord {
            id: Some("esp-8e0f18e7".to_string()),
            title: Some("It's Wavy (Original Mix)".to_string()),
            artist: Some("Pastiche".to_string()),
            album: Some("Black Lights EP".to_string()),
            release_date: Some("2021-02-08".to_string()),
            starting_key: Some("4B".to_string()),
            bpm: Some("125".to_string()),
            rating_stars: Some(4),
            search_key: Some("its wavy original pastiche".to_string()),
            ..CanonicalRecord::default()
        }
    }

    fn load(dir: &TempDir) -> VersionStore {
        VersionStore::load(dir.path(), CorruptBatchPolicy::Abort).unwrap()
    }

    /// One full run: resolve, append when new, flush.
    fn run_once(dir: &TempDir, batch: &str, record: CanonicalRecord) -> Resolution {
        let mut store = load(dir);
        let resolution = store.resolve(&record).unwrap();
        if resolution.is_new {
            store
                .append(record.with_revision(resolution.revision))
                .unwrap();
        }
        store.flush(batch).unwrap();
        resolution
    }

    fn batch_count(dir: &TempDir) -> usize {
        fs::read_dir(dir.path()).unwrap().count()
    }

    #[test]
    fn fresh_directory_has_no_history() {
        let dir = TempDir::new().unwrap();
        let store = VersionStore::load(dir.path().join("history"), CorruptBatchPolicy::Abort)
            .unwrap();
        assert!(store.dir().is_dir());
        assert_eq!(store.stats().snapshots, 0);
        assert_eq!(
            store.resolve(&wavy()).unwrap(),
            Resolution {
                is_new: true,
                revision: 1
            }
        );
    }

    #[test]
    fn identical_record_in_a_later_run_is_not_a_new_version() {
        let dir = TempDir::new().unwrap();
        let first = run_once(&dir, "2024-01-01@10:00", wavy());
        assert_eq!(first, Resolution { is_new: true, revision: 1 });

        let mut again = wavy();
        again.search_key = Some("something else entirely".to_string());
        let second = run_once(&dir, "2024-01-02@10:00", again);
        assert_eq!(second, Resolution { is_new: false, revision: 1 });
        assert_eq!(batch_count(&dir), 1);
    }

    #[test]
    fn changed_title_gets_the_next_revision() {
        let dir = TempDir::new().unwrap();
        run_once(&dir, "2024-01-01@10:00", wavy());

        let mut retitled = wavy();
        retitled.title = Some("It's Wavy (Extended Mix)".to_string());
        let second = run_once(&dir, "2024-01-02@10:00", retitled);
        assert_eq!(second, Resolution { is_new: true, revision: 2 });

        let store = load(&dir);
        let revisions: Vec<u32> = store
            .history("esp-8e0f18e7")
            .iter()
            .map(|snapshot| snapshot.revision)
            .collect();
        assert_eq!(revisions, vec![1, 2]);
    }

    #[test]
    fn revisions_are_dense_across_runs() {
        let dir = TempDir::new().unwrap();
        for (run, bpm) in ["120", "121", "122", "121", "123"].iter().enumerate() {
            let mut record = wavy();
            record.bpm = Some(bpm.to_string());
            run_once(&dir, &format!("2024-01-0{}@10:00", run + 1), record);
        }

        let store = load(&dir);
        let revisions: Vec<u32> = store
            .history("esp-8e0f18e7")
            .iter()
            .map(|snapshot| snapshot.revision)
            .collect();
        assert_eq!(revisions, vec![1, 2, 3, 4]);

        let mut back_to_second = wavy();
        back_to_second.bpm = Some("121".to_string());
        assert_eq!(
            store.resolve(&back_to_second).unwrap(),
            Resolution { is_new: false, revision: 2 }
        );
    }

    #[test]
    fn resolve_is_idempotent() {
        let dir = TempDir::new().unwrap();
        run_once(&dir, "2024-01-01@10:00", wavy());
        let store = load(&dir);
        let mut changed = wavy();
        changed.genre = Some("Minimal / Deep Tech".to_string());
        assert_eq!(store.resolve(&changed).unwrap(), store.resolve(&changed).unwrap());
        assert_eq!(store.resolve(&wavy()).unwrap(), store.resolve(&wavy()).unwrap());
    }

    #[test]
    fn field_present_on_one_side_only_is_a_new_version() {
        let dir = TempDir::new().unwrap();
        run_once(&dir, "2024-01-01@10:00", wavy());
        let store = load(&dir);

        let mut with_genre = wavy();
        with_genre.genre = Some("House".to_string());
        assert!(store.resolve(&with_genre).unwrap().is_new);

        let mut without_bpm = wavy();
        without_bpm.bpm = None;
        assert!(store.resolve(&without_bpm).unwrap().is_new);
    }

    #[test]
    fn empty_flush_writes_nothing_and_can_repeat() {
        let dir = TempDir::new().unwrap();
        let mut store = load(&dir);
        assert!(!store.flush("2024-01-01@10:00").unwrap());
        assert!(!store.flush("2024-01-01@10:00").unwrap());
        assert_eq!(batch_count(&dir), 0);
    }

    #[test]
    fn store_is_terminal_after_a_written_flush() {
        let dir = TempDir::new().unwrap();
        let mut store = load(&dir);
        store.append(wavy().with_revision(1)).unwrap();
        assert!(store.flush("2024-01-01@10:00").unwrap());
        assert!(matches!(
            store.flush("2024-01-01@10:01"),
            Err(HistoryError::AlreadyFlushed)
        ));
        assert!(matches!(
            store.append(wavy().with_revision(2)),
            Err(HistoryError::AlreadyFlushed)
        ));
    }

    #[test]
    fn append_rejects_wrong_revision() {
        let dir = TempDir::new().unwrap();
        let mut store = load(&dir);
        let err = store.append(wavy().with_revision(3)).unwrap_err();
        assert!(matches!(
            err,
            HistoryError::RevisionConflict {
                expected: 1,
                found: Some(3),
                ..
            }
        ));
        assert!(matches!(
            store.append(wavy()),
            Err(HistoryError::RevisionConflict { found: None, .. })
        ));
        assert!(store.pending().is_empty());
    }

    #[test]
    fn appended_versions_are_visible_within_the_run() {
        let dir = TempDir::new().unwrap();
        let mut store = load(&dir);
        store.append(wavy().with_revision(1)).unwrap();
        assert_eq!(
            store.resolve(&wavy()).unwrap(),
            Resolution { is_new: false, revision: 1 }
        );
        let mut changed = wavy();
        changed.bpm = Some("126".to_string());
        assert_eq!(store.resolve(&changed).unwrap().revision, 2);
    }

    #[test]
    fn record_without_id_cannot_be_versioned() {
        let dir = TempDir::new().unwrap();
        let mut store = load(&dir);
        let mut record = wavy();
        record.id = None;
        assert!(matches!(
            store.resolve(&record),
            Err(HistoryError::IdentityMissing)
        ));
        assert!(matches!(
            store.append(record.with_revision(1)),
            Err(HistoryError::IdentityMissing)
        ));
    }

    #[test]
    fn existing_batch_is_never_overwritten() {
        let dir = TempDir::new().unwrap();
        run_once(&dir, "2024-01-01@10:00", wavy());

        let mut store = load(&dir);
        let mut other = wavy();
        other.id = Some("esp-00000000".to_string());
        store.append(other.with_revision(1)).unwrap();
        assert!(matches!(
            store.flush("2024-01-01@10:00"),
            Err(HistoryError::BatchExists(_))
        ));
        assert!(matches!(
            store.flush("../escape"),
            Err(HistoryError::InvalidBatchName(_))
        ));
        assert_eq!(batch_count(&dir), 1);
    }

    #[test]
    fn dates_round_trip_through_a_batch() {
        let dir = TempDir::new().unwrap();
        run_once(&dir, "2024-01-01@10:00", wavy());
        let contents = fs::read_to_string(dir.path().join("2024-01-01@10:00.jsonl")).unwrap();
        assert!(contents.contains(r#""release_date":"2021-02-08""#));
        assert!(contents.contains(r#""revision":1"#));
        assert!(!contents.contains("genre"));

        let store = load(&dir);
        let stored = &store.history("esp-8e0f18e7")[0].record;
        assert_eq!(stored.release_date.as_deref(), Some("2021-02-08"));
        assert_eq!(stored, &wavy().with_revision(1));
    }

    #[test]
    fn batches_load_in_file_name_order_and_legacy_rows_get_positions() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("2024-02-01@09:00.jsonl"),
            "{\"id\":\"esp-1\",\"title\":\"B\"}\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("2024-01-01@09:00.jsonl"),
            "{\"id\":\"esp-1\",\"title\":\"A\",\"stars\":3}\n",
        )
        .unwrap();

        let store = load(&dir);
        let history = store.history("esp-1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].record.title.as_deref(), Some("A"));
        assert_eq!(history[0].revision, 1);
        assert_eq!(history[0].record.rating_stars, Some(3));
        assert_eq!(history[1].record.title.as_deref(), Some("B"));
        assert_eq!(history[1].revision, 2);
        assert_eq!(store.stats().batches, 2);
    }

    #[test]
    fn corrupt_batch_aborts_by_default() {
        let dir = TempDir::new().unwrap();
        run_once(&dir, "2024-01-01@10:00", wavy());
        fs::write(
            dir.path().join("2024-01-02@10:00.jsonl"),
            "{\"id\":\"esp-1\"}\n{not json}\n",
        )
        .unwrap();

        let err = VersionStore::load(dir.path(), CorruptBatchPolicy::Abort).unwrap_err();
        match err {
            HistoryError::CorruptBatch { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }

        let store = VersionStore::load(dir.path(), CorruptBatchPolicy::Skip).unwrap();
        assert_eq!(store.stats().batches, 1);
        assert!(store.history("esp-1").is_empty());
        assert_eq!(store.history("esp-8e0f18e7").len(), 1);
    }

    #[test]
    fn truncated_batch_is_corrupt() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("2024-01-01@10:00.jsonl"),
            "{\"id\":\"esp-1\",\"revision\":1}\n{\"id\":\"esp-2\",\"revision\":1}",
        )
        .unwrap();
        assert!(matches!(
            VersionStore::load(dir.path(), CorruptBatchPolicy::Abort),
            Err(HistoryError::CorruptBatch { .. })
        ));
    }

    #[test]
    fn leftover_temp_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".2024-01-01@10:00.jsonl.tmp"),
            "{\"id\":\"esp-1\",\"rev",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not a batch").unwrap();
        let store = load(&dir);
        assert_eq!(store.stats().batches, 0);
    }

    #[test]
    fn batch_name_is_sortable_timestamp() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(batch_name(at), "2023-11-14@22:13:20");

        let mut names = vec![
            "2023-11-14@22:13:20".to_string(),
            "2023-11-14@22:13".to_string(),
            "2023-11-14@22:12:59".to_string(),
        ];
        names.sort();
        assert_eq!(
            names,
            vec!["2023-11-14@22:12:59", "2023-11-14@22:13", "2023-11-14@22:13:20"]
        );
    }

    #[test]
    fn taken_batch_name_gets_a_suffix() {
        let dir = TempDir::new().unwrap();
        let store = load(&dir);
        assert_eq!(store.next_batch_name("2024-01-01@10:00:00"), "2024-01-01@10:00:00");
        drop(store);

        run_once(&dir, "2024-01-01@10:00:00", wavy());
        let mut store = load(&dir);
        let name = store.next_batch_name("2024-01-01@10:00:00");
        assert_eq!(name, "2024-01-01@10:00:00-2");

        let mut changed = wavy();
        changed.bpm = Some("126".to_string());
        store.append(changed.with_revision(2)).unwrap();
        assert!(store.flush(&name).unwrap());
        assert_eq!(store.next_batch_name("2024-01-01@10:00:00"), "2024-01-01@10:00:00-3");

        let store = load(&dir);
        let revisions: Vec<u32> = store
            .history("esp-8e0f18e7")
            .iter()
            .map(|snapshot| snapshot.revision)
            .collect();
        assert_eq!(revisions, vec![1, 2]);
    }

    #[test]
    fn failed_write_leaves_no_batch_and_keeps_pending() {
        let dir = TempDir::new().unwrap();
        let mut store = load(&dir);
        store.append(wavy().with_revision(1)).unwrap();

        fs::create_dir(dir.path().join(".2024-01-01@10:00:00.jsonl.tmp")).unwrap();
        assert!(matches!(
            store.flush("2024-01-01@10:00:00"),
            Err(HistoryError::Io(_))
        ));
        assert!(!dir.path().join("2024-01-01@10:00:00.jsonl").exists());
        assert_eq!(store.pending().len(), 1);

        let reloaded = load(&dir);
        assert_eq!(reloaded.stats().batches, 0);
        assert!(reloaded.history("esp-8e0f18e7").is_empty());

        assert!(store.flush("2024-01-01@10:00:01").unwrap());
        assert_eq!(load(&dir).history("esp-8e0f18e7").len(), 1);
    }

    #[test]
    fn numeric_columns_compare_equal_to_text() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("2024-01-01@10:00.jsonl"),
            "{\"id\":\"esp-1\",\"title\":\"A\",\"bpm\":125,\"rating_stars\":4,\"revision\":1}\n\
             {\"id\":\"esp-2\",\"title\":\"B\",\"bpm\":\"126\",\"stars\":3.0}\n",
        )
        .unwrap();
        let store = load(&dir);

        let first = CanonicalRecord {
            id: Some("esp-1".to_string()),
            title: Some("A".to_string()),
            bpm: Some("125".to_string()),
            rating_stars: Some(4),
            ..CanonicalRecord::default()
        };
        assert_eq!(
            store.resolve(&first).unwrap(),
            Resolution { is_new: false, revision: 1 }
        );

        let second = CanonicalRecord {
            id: Some("esp-2".to_string()),
            title: Some("B".to_string()),
            bpm: Some("126".to_string()),
            rating_stars: Some(3),
            ..CanonicalRecord::default()
        };
        assert_eq!(
            store.resolve(&second).unwrap(),
            Resolution { is_new: false, revision: 1 }
        );
    }
}
