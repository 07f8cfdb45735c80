use std::fmt;
use std::fs;
use std::path::Path;

use common::{rating_display, CanonicalRecord, CatalogEntry};
use metadata::{normalize_with_report, KeyNotation, RawTagMapping};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{HistoryError, VersionStore};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub processed: usize,
    pub new_versions: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub degraded: usize,
    pub batch_written: bool,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tracks: {} new versions, {} unchanged, {} skipped, {} degraded",
            self.processed, self.new_versions, self.unchanged, self.skipped, self.degraded
        )?;
        if self.batch_written {
            write!(f, " (batch written)")
        } else {
            write!(f, " (no batch written)")
        }
    }
}

#[derive(Clone, Debug)]
pub enum TrackOutcome {
    New(CatalogEntry),
    Unchanged { id: String, revision: u32 },
    Skipped { source: Option<String>, reason: String },
}

/// One catalog rebuild: every track goes through normalize, resolve and
/// (when new) append; `finish` writes the run's batch.
pub struct CatalogRun {
    store: VersionStore,
    notation: KeyNotation,
    summary: RunSummary,
    accepted: Vec<CatalogEntry>,
}

impl CatalogRun {
    pub fn new(store: VersionStore, notation: KeyNotation) -> Self {
        Self {
            store,
            notation,
            summary: RunSummary::default(),
            accepted: Vec::new(),
        }
    }

    pub fn process(
        &mut self,
        raw: RawTagMapping,
        source: Option<&str>,
    ) -> Result<TrackOutcome, HistoryError> {
        let (record, report) = normalize_with_report(raw);
        if report.is_degraded() {
            self.summary.degraded += 1;
        }
        self.record(record, source)
    }

    /// Versions an already normalized record.
    pub fn record(
        &mut self,
        record: CanonicalRecord,
        source: Option<&str>,
    ) -> Result<TrackOutcome, HistoryError> {
        self.summary.processed += 1;

        let resolution = match self.store.resolve(&record) {
            Ok(resolution) => resolution,
            Err(HistoryError::IdentityMissing) => {
                warn!("Skipping {}: no id", source.unwrap_or("<unknown source>"));
                self.summary.skipped += 1;
                return Ok(TrackOutcome::Skipped {
                    source: source.map(str::to_string),
                    reason: HistoryError::IdentityMissing.to_string(),
                });
            }
            Err(err) => return Err(err),
        };

        if !resolution.is_new {
            self.summary.unchanged += 1;
            return Ok(TrackOutcome::Unchanged {
                id: record.id.unwrap_or_default(),
                revision: resolution.revision,
            });
        }

        let record = record.with_revision(resolution.revision);
        self.store.append(record.clone())?;
        info!(
            "New version {} of {} ({})",
            resolution.revision,
            record.id.as_deref().unwrap_or_default(),
            record.title.as_deref().unwrap_or("untitled")
        );

        let entry = catalog_entry(record, self.notation, source);
        self.accepted.push(entry.clone());
        self.summary.new_versions += 1;
        Ok(TrackOutcome::New(entry))
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.accepted
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    pub fn finish(
        mut self,
        batch_name: &str,
    ) -> Result<(RunSummary, Vec<CatalogEntry>), HistoryError> {
        self.summary.batch_written = self.store.flush(batch_name)?;
        info!("Catalog run finished: {}", self.summary);
        Ok((self.summary, self.accepted))
    }
}

/// Entries rated at least `min_stars`.
pub fn select_entries(entries: &[CatalogEntry], min_stars: u8) -> Vec<&CatalogEntry> {
    entries
        .iter()
        .filter(|entry| entry.record.rating_stars.unwrap_or(0) >= min_stars)
        .collect()
}

/// Writes entries as JSON lines for renderers. Returns the number written.
pub fn write_entries(path: &Path, entries: &[&CatalogEntry]) -> Result<usize, HistoryError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut contents = String::new();
    for entry in entries {
        contents.push_str(&serde_json::to_string(entry)?);
        contents.push('\n');
    }
    fs::write(path, contents)?;
    Ok(entries.len())
}

fn catalog_entry(
    record: CanonicalRecord,
    notation: KeyNotation,
    source: Option<&str>,
) -> CatalogEntry {
    let key = record
        .starting_key
        .as_deref()
        .map(|key| notation.render(key))
        .unwrap_or_default();
    let key_bpm = format!("{} - {}", key, record.bpm.as_deref().unwrap_or(""));
    CatalogEntry {
        rating_display: rating_display(record.rating_stars.unwrap_or(0)),
        key_bpm,
        source: source.map(str::to_string),
        record,
    }
}
