//! One fetch cycle: fetch → normalize → derive → snapshot.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use macrowatch_core::cache::{CacheError, Snapshot};
use macrowatch_core::data::{DataError, DateRange};
use macrowatch_core::registry::Registry;
use macrowatch_core::table::normalize;

use crate::config::{ConfigError, FetchConfig};
use crate::fetch::{fetch_all, Providers};

/// Errors that stop a pipeline run. Per-series fetch failures are not among
/// them; those end up in the snapshot's failure list.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to build fetch thread pool: {0}")]
    ThreadPool(String),

    #[error("provider setup failed: {0}")]
    Provider(#[from] DataError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Run a full cycle against `providers` and assemble the snapshot.
pub fn run_pipeline(
    registry: &Registry,
    providers: &Providers,
    fetch: &FetchConfig,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Snapshot, PipelineError> {
    let range = DateRange::lookback(today, fetch.lookback_years);
    tracing::info!(start = %range.start, end = %range.end, indicators = registry.len(), "running pipeline");

    let outcome = fetch_all(registry, providers, range, fetch.workers)?;
    let tables = normalize(&outcome.series, registry);

    tracing::info!(
        rows = tables.raw.len(),
        columns = tables.raw.width(),
        failures = outcome.failures.len(),
        "pipeline complete"
    );

    Ok(Snapshot::new(
        tables.raw,
        tables.filled,
        tables.last_valid_dates,
        outcome.failures,
        now,
    )?)
}
