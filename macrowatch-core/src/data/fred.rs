//! FRED statistics API provider.
//!
//! One GET per series id against `/fred/series/observations`. Missing
//! observations are reported by FRED as the string `"."` and are skipped.
//! Candidate-id fallback is handled by the orchestrator, not here: this
//! provider reports `SeriesNotFound` for unknown or empty series so the next
//! candidate can be tried.

use super::circuit_breaker::CircuitBreaker;
use super::http::{build_client, get_text, HttpSettings};
use super::provider::{DataError, DateRange, FetchResult, Observation, SeriesProvider};
use crate::registry::Source;
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

pub const FRED_BASE_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Vec<RawObservation>,
}

#[derive(Debug, Deserialize)]
struct RawObservation {
    date: String,
    value: String,
}

/// FRED data provider.
pub struct FredProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    settings: HttpSettings,
    api_key: String,
    base_url: String,
}

impl FredProvider {
    pub fn new(
        api_key: impl Into<String>,
        circuit_breaker: Arc<CircuitBreaker>,
        settings: HttpSettings,
    ) -> Result<Self, DataError> {
        let client = build_client(&settings)?;
        Ok(Self {
            client,
            circuit_breaker,
            settings,
            api_key: api_key.into(),
            base_url: FRED_BASE_URL.to_string(),
        })
    }

    /// Point the provider at another endpoint (mirrors, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Parse an observations payload into dated values.
    fn parse_response(series_id: &str, body: &str) -> Result<Vec<Observation>, DataError> {
        let resp: ObservationsResponse = serde_json::from_str(body).map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse FRED response for {series_id}: {e}"))
        })?;

        let mut out = Vec::with_capacity(resp.observations.len());
        for raw in resp.observations {
            let value = raw.value.trim();
            if value == "." || value.is_empty() {
                continue;
            }
            let date = NaiveDate::parse_from_str(&raw.date, "%Y-%m-%d").map_err(|e| {
                DataError::ResponseFormatChanged(format!("bad FRED date '{}': {e}", raw.date))
            })?;
            let Ok(value) = value.parse::<f64>() else {
                tracing::debug!(series_id, value, "skipping non-numeric FRED value");
                continue;
            };
            out.push(Observation::new(date, value));
        }
        Ok(out)
    }
}

impl SeriesProvider for FredProvider {
    fn name(&self) -> &str {
        "fred"
    }

    fn source(&self) -> Source {
        Source::Fred
    }

    fn fetch(&self, series_id: &str, range: DateRange) -> Result<FetchResult, DataError> {
        if series_id.trim().is_empty() {
            return Err(DataError::InvalidSourceId {
                id: series_id.to_string(),
                reason: "empty series id".into(),
            });
        }

        let query = [
            ("series_id", series_id.to_string()),
            ("api_key", self.api_key.clone()),
            ("file_type", "json".to_string()),
            ("observation_start", range.start.format("%Y-%m-%d").to_string()),
            ("observation_end", range.end.format("%Y-%m-%d").to_string()),
            ("sort_order", "asc".to_string()),
        ];

        let body = get_text(
            &self.client,
            &self.circuit_breaker,
            &self.settings,
            &self.base_url,
            &query,
            series_id,
        )?;

        let observations = Self::parse_response(series_id, &body)?;
        if observations.is_empty() {
            return Err(DataError::SeriesNotFound {
                id: series_id.to_string(),
            });
        }

        tracing::debug!(series_id, count = observations.len(), "fetched FRED series");
        Ok(FetchResult::new(series_id, Source::Fred, observations))
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_missing_markers() {
        let body = r#"{"observations":[
            {"realtime_start":"2024-01-10","date":"2024-01-01","value":"7700000"},
            {"realtime_start":"2024-01-10","date":"2024-01-02","value":"."},
            {"realtime_start":"2024-01-10","date":"2024-01-03","value":"7710000.5"}
        ]}"#;
        let obs = FredProvider::parse_response("WALCL", body).unwrap();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[1].value, 7_710_000.5);
    }

    #[test]
    fn parse_rejects_unexpected_shape() {
        let err = FredProvider::parse_response("WALCL", r#"{"seriess":[]}"#).unwrap_err();
        assert!(matches!(err, DataError::ResponseFormatChanged(_)));
    }

    #[test]
    fn parse_rejects_bad_dates() {
        let body = r#"{"observations":[{"date":"01/02/2024","value":"1"}]}"#;
        assert!(FredProvider::parse_response("X", body).is_err());
    }
}
