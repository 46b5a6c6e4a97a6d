//! On-disk snapshot store.
//!
//! Layout under `{cache_dir}`:
//! - `raw.parquet`: unmodified merged table
//! - `filled.parquet`: forward-filled table
//! - `snapshot.json`: metadata, written last
//!
//! Each file is written to `.tmp` and renamed into place. The metadata
//! sidecar carries a BLAKE3 hash of the raw table; a snapshot whose tables
//! fail to load or do not match the hash is quarantined (`*.quarantined`)
//! and reported as corrupt, which callers treat as a cache miss.

use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::table::{self, MergedTable};

/// Bumped whenever the on-disk layout changes; older snapshots are misses.
pub const SCHEMA_VERSION: u32 = 1;

const RAW_FILE: &str = "raw.parquet";
const FILLED_FILE: &str = "filled.parquet";
const META_FILE: &str = "snapshot.json";
const DATE_COLUMN: &str = "date";

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("no cached snapshot")]
    NotCached,

    #[error("corrupt cache file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("snapshot schema v{found} does not match v{expected}")]
    SchemaMismatch { found: u32, expected: u32 },

    #[error("refusing to persist a snapshot with no columns")]
    EmptySnapshot,

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("cache I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::Io(e.to_string())
    }
}

/// A series that could not be fetched during the cycle that built a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub indicator: String,
    pub source: String,
    /// Upstream ids that were tried, in order.
    pub tried: Vec<String>,
    pub error: String,
}

/// Metadata sidecar for a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub rows: usize,
    pub columns: Vec<String>,
    pub last_valid_dates: BTreeMap<String, NaiveDate>,
    #[serde(default)]
    pub failures: Vec<FetchFailure>,
    pub data_hash: String,
}

impl SnapshotMeta {
    /// Age of the snapshot at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

/// Everything one fetch cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub raw: MergedTable,
    pub filled: MergedTable,
    pub meta: SnapshotMeta,
}

impl Snapshot {
    pub fn new(
        raw: MergedTable,
        filled: MergedTable,
        last_valid_dates: BTreeMap<String, NaiveDate>,
        failures: Vec<FetchFailure>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CacheError> {
        let data_hash = table_hash(&raw)?;
        let meta = SnapshotMeta {
            schema_version: SCHEMA_VERSION,
            created_at,
            rows: raw.len(),
            columns: raw.column_names().map(str::to_string).collect(),
            last_valid_dates,
            failures,
            data_hash,
        };
        Ok(Self { raw, filled, meta })
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// BLAKE3 hex digest of a table's serialized form.
pub fn table_hash(table: &MergedTable) -> Result<String, CacheError> {
    let bytes = serde_json::to_vec(table).map_err(|e| CacheError::Serialization(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// What is on disk, for `cache status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub cache_dir: PathBuf,
    pub meta: Option<SnapshotMeta>,
    pub size_bytes: u64,
    pub quarantined: usize,
}

/// Snapshot persistence rooted at one directory.
pub struct SnapshotStore {
    cache_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.cache_dir.join(file)
    }

    /// Persist a snapshot. The metadata goes last so a half-written snapshot
    /// is never mistaken for a complete one.
    pub fn write(&self, snapshot: &Snapshot) -> Result<(), CacheError> {
        if snapshot.is_empty() {
            return Err(CacheError::EmptySnapshot);
        }
        fs::create_dir_all(&self.cache_dir)?;

        let meta_path = self.path(META_FILE);
        if meta_path.exists() {
            fs::remove_file(&meta_path)?;
        }

        write_table(&snapshot.raw, &self.path(RAW_FILE))?;
        write_table(&snapshot.filled, &self.path(FILLED_FILE))?;

        let json = serde_json::to_string_pretty(&snapshot.meta)
            .map_err(|e| CacheError::Serialization(format!("meta serialization: {e}")))?;
        atomic_write(&meta_path, json.as_bytes())?;

        tracing::debug!(
            dir = %self.cache_dir.display(),
            rows = snapshot.meta.rows,
            columns = snapshot.meta.columns.len(),
            "snapshot written"
        );
        Ok(())
    }

    /// Read only the metadata sidecar.
    pub fn read_meta(&self) -> Option<SnapshotMeta> {
        let content = fs::read_to_string(self.path(META_FILE)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Load and validate the snapshot. Corrupt files are quarantined.
    pub fn load(&self) -> Result<Snapshot, CacheError> {
        let meta_path = self.path(META_FILE);
        let content = match fs::read_to_string(&meta_path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(CacheError::NotCached),
            Err(e) => return Err(e.into()),
        };

        let meta: SnapshotMeta = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => return Err(self.quarantine(&meta_path, format!("unreadable metadata: {e}"))),
        };

        if meta.schema_version != SCHEMA_VERSION {
            return Err(CacheError::SchemaMismatch {
                found: meta.schema_version,
                expected: SCHEMA_VERSION,
            });
        }

        let raw_path = self.path(RAW_FILE);
        let raw = match read_table(&raw_path) {
            Ok(t) => t,
            Err(e) => {
                let _ = self.quarantine(&meta_path, "table unreadable".into());
                return Err(self.quarantine(&raw_path, e.to_string()));
            }
        };

        let hash = table_hash(&raw)?;
        if hash != meta.data_hash {
            let _ = self.quarantine(&meta_path, "hash mismatch".into());
            return Err(self.quarantine(&raw_path, "data hash does not match metadata".into()));
        }

        let filled_path = self.path(FILLED_FILE);
        let filled = match read_table(&filled_path) {
            Ok(t) => t,
            Err(e) => {
                let _ = self.quarantine(&meta_path, "table unreadable".into());
                return Err(self.quarantine(&filled_path, e.to_string()));
            }
        };

        Ok(Snapshot { raw, filled, meta })
    }

    fn quarantine(&self, path: &Path, reason: String) -> CacheError {
        let mut target = path.as_os_str().to_owned();
        target.push(".quarantined");
        tracing::warn!(path = %path.display(), %reason, "quarantining corrupt cache file");
        if let Err(e) = fs::rename(path, PathBuf::from(target)) {
            tracing::warn!(path = %path.display(), error = %e, "quarantine rename failed");
        }
        CacheError::Corrupt {
            path: path.to_path_buf(),
            reason,
        }
    }

    pub fn status(&self) -> CacheStatus {
        let mut size_bytes = 0;
        let mut quarantined = 0;
        if let Ok(entries) = fs::read_dir(&self.cache_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if let Ok(md) = entry.metadata() {
                    if md.is_file() {
                        size_bytes += md.len();
                    }
                }
                if path.extension().and_then(|e| e.to_str()) == Some("quarantined") {
                    quarantined += 1;
                }
            }
        }
        CacheStatus {
            cache_dir: self.cache_dir.clone(),
            meta: self.read_meta(),
            size_bytes,
            quarantined,
        }
    }

    /// Remove the snapshot and any quarantined files. Other files in the
    /// directory (the live fetch log) are left alone. Returns files removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let ours = [RAW_FILE, FILLED_FILE, META_FILE]
                .iter()
                .any(|f| name == *f || name.starts_with(&format!("{f}.")));
            if ours {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        CacheError::Io(format!("atomic rename failed: {e}"))
    })
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn table_to_dataframe(table: &MergedTable) -> Result<DataFrame, CacheError> {
    let dates: Vec<i32> = table
        .dates()
        .iter()
        .map(|d| (*d - epoch()).num_days() as i32)
        .collect();

    let mut columns = Vec::with_capacity(table.width() + 1);
    columns.push(
        Column::new(DATE_COLUMN.into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| CacheError::Parquet(format!("date cast: {e}")))?,
    );
    for col in table.columns() {
        if col.name == DATE_COLUMN {
            return Err(CacheError::Parquet("indicator column may not be named 'date'".into()));
        }
        columns.push(Column::new(col.name.as_str().into(), col.values.clone()));
    }

    DataFrame::new(columns).map_err(|e| CacheError::Parquet(format!("dataframe creation: {e}")))
}

fn dataframe_to_table(df: &DataFrame) -> Result<MergedTable, CacheError> {
    let map_err = |e: PolarsError| CacheError::Parquet(format!("column read: {e}"));

    let date_ca = df
        .column(DATE_COLUMN)
        .map_err(map_err)?
        .date()
        .map_err(|e| CacheError::Parquet(format!("date column type: {e}")))?;

    let n = df.height();
    let mut dates = Vec::with_capacity(n);
    for i in 0..n {
        let days = date_ca
            .get(i)
            .ok_or_else(|| CacheError::Parquet(format!("null date at row {i}")))?;
        dates.push(epoch() + chrono::Duration::days(days as i64));
    }

    let mut columns = Vec::with_capacity(df.width().saturating_sub(1));
    for col in df.get_columns() {
        let name = col.name().to_string();
        if name == DATE_COLUMN {
            continue;
        }
        let ca = col
            .f64()
            .map_err(|e| CacheError::Parquet(format!("{name} column type: {e}")))?;
        let values = (0..n).map(|i| ca.get(i)).collect();
        columns.push(table::Column { name, values });
    }

    MergedTable::from_parts(dates, columns).map_err(|e| CacheError::Parquet(e.to_string()))
}

fn write_table(table: &MergedTable, path: &Path) -> Result<(), CacheError> {
    let mut df = table_to_dataframe(table)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let file = fs::File::create(&tmp)?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .map_err(|e| CacheError::Parquet(format!("write parquet: {e}")))?;

    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        CacheError::Io(format!("atomic rename failed: {e}"))
    })
}

fn read_table(path: &Path) -> Result<MergedTable, CacheError> {
    let file = fs::File::open(path)?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| CacheError::Parquet(format!("read: {e}")))?;
    if df.column(DATE_COLUMN).is_err() {
        return Err(CacheError::Parquet("missing date column".into()));
    }
    dataframe_to_table(&df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Series;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sample_snapshot() -> Snapshot {
        let raw = MergedTable::from_series(&[
            Series::new("us10y", vec![(d("2024-01-02"), 4.0), (d("2024-01-04"), 4.1)]),
            Series::new("sofr", vec![(d("2024-01-03"), 5.31)]),
        ]);
        let filled = raw.forward_filled();
        let lv = raw.last_valid_dates();
        Snapshot::new(raw, filled, lv, vec![], Utc::now()).unwrap()
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let snap = sample_snapshot();

        store.write(&snap).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.raw, snap.raw);
        assert_eq!(loaded.filled, snap.filled);
        assert_eq!(loaded.meta, snap.meta);
        assert_eq!(loaded.raw.get("us10y", d("2024-01-03")), None);
    }

    #[test]
    fn missing_cache_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nowhere"));
        assert!(matches!(store.load(), Err(CacheError::NotCached)));
    }

    #[test]
    fn empty_snapshot_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let empty = Snapshot::new(
            MergedTable::default(),
            MergedTable::default(),
            BTreeMap::new(),
            vec![],
            Utc::now(),
        )
        .unwrap();
        assert!(matches!(store.write(&empty), Err(CacheError::EmptySnapshot)));
        assert!(store.read_meta().is_none());
    }

    #[test]
    fn corrupt_table_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.write(&sample_snapshot()).unwrap();

        fs::write(dir.path().join(RAW_FILE), b"not parquet").unwrap();

        assert!(matches!(store.load(), Err(CacheError::Corrupt { .. })));
        assert!(dir.path().join("raw.parquet.quarantined").exists());
        // Metadata is moved aside too, so the next load is a plain miss.
        assert!(matches!(store.load(), Err(CacheError::NotCached)));
        assert_eq!(store.status().quarantined, 2);
    }

    #[test]
    fn garbage_metadata_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.write(&sample_snapshot()).unwrap();
        fs::write(dir.path().join(META_FILE), b"{ nope").unwrap();
        assert!(matches!(store.load(), Err(CacheError::Corrupt { .. })));
        assert!(dir.path().join("snapshot.json.quarantined").exists());
    }

    #[test]
    fn clear_keeps_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.write(&sample_snapshot()).unwrap();
        fs::write(dir.path().join("live_fetch_log.json"), b"{}").unwrap();

        assert_eq!(store.clear().unwrap(), 3);
        assert!(store.read_meta().is_none());
        assert!(dir.path().join("live_fetch_log.json").exists());
    }
}
