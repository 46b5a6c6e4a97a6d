//! Fetch orchestration across providers.
//!
//! Indicators are grouped by source. Sources whose upstream can answer many
//! ids at once (Yahoo spark, the H.4.1 page) get one batch request up front;
//! everything else is fetched per indicator on a private bounded thread pool.
//! Each indicator walks its candidate ids in order until one returns data.
//! Failures are isolated: a failed indicator is logged, recorded as a
//! [`FetchFailure`] and left out of the result.

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

use macrowatch_core::cache::FetchFailure;
use macrowatch_core::data::{
    BatchFetch, CircuitBreaker, DataError, DateRange, FetchResult, FredProvider, H41Scraper, HttpSettings,
    JsonApiProvider, SeriesProvider, YahooProvider,
};
use macrowatch_core::registry::{IndicatorDef, Registry, Source};
use macrowatch_core::table::RawSeriesMap;

use crate::pipeline::PipelineError;

/// The set of providers available to a fetch cycle, keyed by source.
#[derive(Default)]
pub struct Providers {
    by_source: BTreeMap<Source, Box<dyn SeriesProvider>>,
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under the source it serves.
    pub fn with(mut self, provider: Box<dyn SeriesProvider>) -> Self {
        self.by_source.insert(provider.source(), provider);
        self
    }

    /// Live HTTP providers, one circuit breaker each. FRED is only
    /// registered when a key is available.
    pub fn live(fred_api_key: Option<&str>, http: &HttpSettings) -> Result<Self, DataError> {
        let breaker = || Arc::new(CircuitBreaker::default_provider());
        let mut providers = Self::new()
            .with(Box::new(YahooProvider::new(breaker(), http.clone())?))
            .with(Box::new(H41Scraper::new(breaker(), http.clone())?))
            .with(Box::new(JsonApiProvider::new(breaker(), http.clone())?));
        if let Some(key) = fred_api_key {
            providers = providers.with(Box::new(FredProvider::new(key, breaker(), http.clone())?));
        }
        Ok(providers)
    }

    pub fn get(&self, source: Source) -> Option<&dyn SeriesProvider> {
        self.by_source.get(&source).map(|p| p.as_ref())
    }
}

/// Everything one fetch cycle produced.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub series: RawSeriesMap,
    pub failures: Vec<FetchFailure>,
}

/// Try each candidate id in order; the first non-empty result wins.
///
/// `prefetched` holds batch results, consulted before issuing a request.
/// An all-empty walk returns the last empty result ("not yet updated").
/// A tripped breaker ends the walk: the remaining ids share the upstream.
pub fn fetch_first_available(
    provider: &dyn SeriesProvider,
    candidates: &[String],
    range: DateRange,
    prefetched: &BatchFetch,
) -> Result<FetchResult, DataError> {
    let mut last_empty = None;
    let mut last_error = None;

    for id in candidates {
        let result = match prefetched.get(id) {
            Some(r) => r.clone(),
            None => provider.fetch(id, range),
        };
        match result {
            Ok(r) if !r.is_empty() => return Ok(r),
            Ok(r) => {
                tracing::debug!(id = %id, "candidate returned no observations");
                last_empty = Some(r);
            }
            Err(e @ (DataError::CircuitBreakerTripped | DataError::AuthenticationRequired(_))) => return Err(e),
            Err(e) => {
                tracing::debug!(id = %id, error = %e, "candidate failed, trying next");
                last_error = Some(e);
            }
        }
    }

    match (last_empty, last_error) {
        (Some(empty), _) => Ok(empty),
        (None, Some(e)) => Err(e),
        (None, None) => Err(DataError::Other("no candidate ids".into())),
    }
}

fn failure(def: &IndicatorDef, error: &DataError) -> FetchFailure {
    FetchFailure {
        indicator: def.name.clone(),
        source: def.source.to_string(),
        tried: def.source_ids.clone(),
        error: error.to_string(),
    }
}

fn fetch_indicator(
    def: &IndicatorDef,
    providers: &Providers,
    range: DateRange,
    prefetched: &BatchFetch,
) -> Result<FetchResult, DataError> {
    let provider = providers
        .get(def.source)
        .ok_or_else(|| DataError::Unavailable(format!("no provider configured for {}", def.source)))?;
    if !provider.is_available() {
        return Err(DataError::CircuitBreakerTripped);
    }
    fetch_first_available(provider, &def.source_ids, range, prefetched)
}

/// Fetch every indicator the cached pipeline owns (everything except derived
/// and live API indicators).
pub fn fetch_all(
    registry: &Registry,
    providers: &Providers,
    range: DateRange,
    workers: usize,
) -> Result<FetchOutcome, PipelineError> {
    let defs: Vec<&IndicatorDef> = registry
        .list_by(|d| !d.is_derived() && d.source != Source::Api);

    // Batch requests first, one per batching source.
    let mut prefetched: BTreeMap<Source, BatchFetch> = BTreeMap::new();
    for source in [Source::Yahoo, Source::WebScrape] {
        let Some(provider) = providers.get(source) else {
            continue;
        };
        if !provider.is_available() {
            continue;
        }
        let mut ids: Vec<&str> = Vec::new();
        for def in defs.iter().filter(|d| d.source == source) {
            // The scrape page is fetched anyway, so every candidate rides along.
            let wanted = if source == Source::WebScrape {
                &def.source_ids[..]
            } else {
                &def.source_ids[..def.source_ids.len().min(1)]
            };
            for id in wanted {
                if !ids.contains(&id.as_str()) {
                    ids.push(id.as_str());
                }
            }
        }
        if ids.is_empty() {
            continue;
        }
        tracing::debug!(provider = provider.name(), count = ids.len(), "batch request");
        prefetched.insert(source, provider.fetch_batch(&ids, range));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;

    let no_batch = BatchFetch::new();
    let results: Vec<(&IndicatorDef, Result<FetchResult, DataError>)> = pool.install(|| {
        defs.par_iter()
            .map(|def| {
                let pre = prefetched.get(&def.source).unwrap_or(&no_batch);
                (*def, fetch_indicator(def, providers, range, pre))
            })
            .collect()
    });

    let mut outcome = FetchOutcome::default();
    for (def, result) in results {
        match result {
            Ok(r) => {
                if r.is_empty() {
                    tracing::info!(indicator = %def.name, "no observations yet");
                }
                outcome.series.insert(def.name.clone(), r);
            }
            Err(e) => {
                tracing::warn!(indicator = %def.name, source = %def.source, error = %e, "fetch failed");
                outcome.failures.push(failure(def, &e));
            }
        }
    }

    tracing::info!(
        fetched = outcome.series.len(),
        failed = outcome.failures.len(),
        "fetch cycle complete"
    );
    Ok(outcome)
}
