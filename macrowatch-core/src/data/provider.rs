//! Series provider trait and structured error types.
//!
//! The `SeriesProvider` trait abstracts over upstreams (FRED, Yahoo Finance,
//! JSON REST endpoints, the H.4.1 page) so the fetch orchestrator can treat
//! them uniformly and tests can substitute in-memory providers.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::registry::Source;

/// One dated numeric observation, as returned by an upstream (before rescale).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Inclusive date window requested from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// `[end − years, end]`.
    pub fn lookback(end: NaiveDate, years: u32) -> Self {
        Self {
            start: end - Duration::days(365 * i64::from(years)),
            end,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Structured error types for fetch operations.
///
/// Every variant is recoverable at the batch level: the orchestrator logs
/// it and leaves the indicator out of the merged table.
#[derive(Debug, Clone, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("series not found: {id}")]
    SeriesNotFound { id: String },

    #[error("invalid source id '{id}': {reason}")]
    InvalidSourceId { id: String, reason: String },

    #[error("HTTP {status} for {id}")]
    Http { status: u16, id: String },

    #[error("hard stop: provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Result of a successful fetch for a single upstream id.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub source_id: String,
    /// Sorted ascending by date, one observation per date.
    pub observations: Vec<Observation>,
    /// Date of the most recent observation (or the report date for scrapes).
    pub observation_date: Option<NaiveDate>,
    pub source: Source,
}

impl FetchResult {
    /// Build a result, sorting by date and keeping the last value per date.
    pub fn new(source_id: impl Into<String>, source: Source, observations: Vec<Observation>) -> Self {
        let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for obs in observations {
            if obs.value.is_finite() {
                by_date.insert(obs.date, obs.value);
            }
        }
        let observations: Vec<Observation> = by_date
            .into_iter()
            .map(|(date, value)| Observation { date, value })
            .collect();
        let observation_date = observations.last().map(|o| o.date);
        Self {
            source_id: source_id.into(),
            observations,
            observation_date,
            source,
        }
    }

    /// "Not yet updated": no observations, not an error.
    pub fn empty(source_id: impl Into<String>, source: Source) -> Self {
        Self {
            source_id: source_id.into(),
            observations: Vec::new(),
            observation_date: None,
            source,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn latest(&self) -> Option<Observation> {
        self.observations.last().copied()
    }
}

/// Per-id results of a batch fetch. Each id succeeds or fails on its own.
pub type BatchFetch = BTreeMap<String, Result<FetchResult, DataError>>;

/// Trait for upstream series providers.
///
/// Providers only know about upstream ids; mapping ids back to indicator
/// names, rescaling and caching happen above this trait.
pub trait SeriesProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Registry source this provider serves.
    fn source(&self) -> Source;

    /// Fetch one series over a date range.
    fn fetch(&self, source_id: &str, range: DateRange) -> Result<FetchResult, DataError>;

    /// Fetch several series. The default issues one request per id;
    /// providers whose upstream supports batching override this.
    fn fetch_batch(&self, source_ids: &[&str], range: DateRange) -> BatchFetch {
        source_ids
            .iter()
            .map(|id| (id.to_string(), self.fetch(id, range)))
            .collect()
    }

    /// Whether the provider currently accepts requests (not blocked).
    fn is_available(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn fetch_result_sorts_and_dedupes() {
        let r = FetchResult::new(
            "X",
            Source::Fred,
            vec![
                Observation::new(d("2024-01-03"), 3.0),
                Observation::new(d("2024-01-01"), 1.0),
                Observation::new(d("2024-01-03"), 4.0),
                Observation::new(d("2024-01-02"), f64::NAN),
            ],
        );
        assert_eq!(r.observations.len(), 2);
        assert_eq!(r.observations[0].date, d("2024-01-01"));
        assert_eq!(r.observations[1].value, 4.0);
        assert_eq!(r.observation_date, Some(d("2024-01-03")));
    }

    #[test]
    fn empty_result_has_no_date() {
        let r = FetchResult::empty("X", Source::WebScrape);
        assert!(r.is_empty());
        assert_eq!(r.observation_date, None);
        assert_eq!(r.latest(), None);
    }

    #[test]
    fn lookback_range() {
        let r = DateRange::lookback(d("2024-12-31"), 1);
        assert_eq!(r.start, d("2024-01-01"));
        assert!(r.contains(d("2024-06-30")));
        assert!(!r.contains(d("2023-12-31")));
    }
}
