//! TTL cache policy over the on-disk snapshot store.

use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;

use macrowatch_core::cache::{CacheError, CacheStatus, Snapshot, SnapshotMeta, SnapshotStore};

use crate::pipeline::PipelineError;

/// How a snapshot was obtained.
#[derive(Debug)]
pub enum CacheOutcome {
    /// Served from disk without running the pipeline.
    Hit(Snapshot),
    /// The pipeline ran. `persisted` is false for empty snapshots and
    /// failed writes.
    Refreshed { snapshot: Snapshot, persisted: bool },
}

impl CacheOutcome {
    pub fn snapshot(&self) -> &Snapshot {
        match self {
            CacheOutcome::Hit(s) => s,
            CacheOutcome::Refreshed { snapshot, .. } => snapshot,
        }
    }

    pub fn into_snapshot(self) -> Snapshot {
        match self {
            CacheOutcome::Hit(s) => s,
            CacheOutcome::Refreshed { snapshot, .. } => snapshot,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, CacheOutcome::Hit(_))
    }
}

pub struct SnapshotCache {
    store: SnapshotStore,
}

impl SnapshotCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: SnapshotStore::new(cache_dir),
        }
    }

    /// Serve a snapshot younger than `ttl`, or run `fetch` and persist what
    /// it returns.
    ///
    /// Any load failure (nothing cached, corrupt files, old schema) is a
    /// miss. A failed write is logged and the fresh snapshot still returned.
    pub fn get_or_fetch<F>(
        &self,
        ttl: Duration,
        force: bool,
        now: DateTime<Utc>,
        fetch: F,
    ) -> Result<CacheOutcome, PipelineError>
    where
        F: FnOnce() -> Result<Snapshot, PipelineError>,
    {
        if !force {
            match self.store.load() {
                Ok(snapshot) => {
                    let age = snapshot.meta.age(now);
                    // A snapshot from the future (clock skew) is not trusted.
                    if age >= Duration::zero() && age < ttl {
                        tracing::info!(age_secs = age.num_seconds(), "cache hit");
                        return Ok(CacheOutcome::Hit(snapshot));
                    }
                    tracing::info!(age_secs = age.num_seconds(), "cache expired");
                }
                Err(CacheError::NotCached) => tracing::info!("cache empty"),
                Err(e) => tracing::warn!(error = %e, "cache unusable, refetching"),
            }
        } else {
            tracing::info!("forced refresh");
        }

        let snapshot = fetch()?;
        if snapshot.is_empty() {
            tracing::warn!("pipeline produced no columns; not caching");
            return Ok(CacheOutcome::Refreshed {
                snapshot,
                persisted: false,
            });
        }

        let persisted = match self.store.write(&snapshot) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "failed to persist snapshot");
                false
            }
        };
        Ok(CacheOutcome::Refreshed { snapshot, persisted })
    }

    /// Whatever is on disk, regardless of age.
    pub fn load_cached(&self) -> Result<Snapshot, CacheError> {
        self.store.load()
    }

    /// Metadata of a snapshot that loads cleanly. Corrupt or outdated
    /// snapshots count as absent.
    pub fn verified_meta(&self) -> Option<SnapshotMeta> {
        match self.store.load() {
            Ok(snapshot) => Some(snapshot.meta),
            Err(CacheError::NotCached) => None,
            Err(e) => {
                tracing::warn!(error = %e, "cached snapshot unusable; treating as absent");
                None
            }
        }
    }

    pub fn status(&self) -> CacheStatus {
        self.store.status()
    }

    pub fn clear(&self) -> Result<usize, CacheError> {
        let removed = self.store.clear()?;
        tracing::info!(removed, dir = %self.store.cache_dir().display(), "cache cleared");
        Ok(removed)
    }
}
