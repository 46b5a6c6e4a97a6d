//! Yahoo Finance market data provider.
//!
//! `fetch` reads daily closes from the v8 chart API. `fetch_batch` asks the
//! v7 spark endpoint for many tickers in one request and falls back to
//! per-ticker chart requests when the spark call itself fails.
//!
//! Yahoo has no official API and is subject to unannounced format changes.

use super::circuit_breaker::CircuitBreaker;
use super::http::{build_client, get_text, HttpSettings};
use super::provider::{BatchFetch, DataError, DateRange, FetchResult, Observation, SeriesProvider};
use crate::registry::Source;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const YAHOO_BASE_URL: &str = "https://query2.finance.yahoo.com";

/// Spark accepts at most this many symbols per request.
const SPARK_CHUNK: usize = 20;

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct SparkResponse {
    spark: SparkResult,
}

#[derive(Debug, Deserialize)]
struct SparkResult {
    result: Option<Vec<SparkEntry>>,
}

#[derive(Debug, Deserialize)]
struct SparkEntry {
    symbol: String,
    response: Vec<ChartData>,
}

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    settings: HttpSettings,
    base_url: String,
}

impl YahooProvider {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>, settings: HttpSettings) -> Result<Self, DataError> {
        let client = build_client(&settings)?;
        Ok(Self {
            client,
            circuit_breaker,
            settings,
            base_url: YAHOO_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Smallest spark `range` string covering the requested window.
    fn spark_range(range: DateRange) -> &'static str {
        let days = (range.end - range.start).num_days();
        match days {
            d if d <= 31 => "1mo",
            d if d <= 92 => "3mo",
            d if d <= 183 => "6mo",
            d if d <= 366 => "1y",
            d if d <= 731 => "2y",
            d if d <= 1827 => "5y",
            d if d <= 3653 => "10y",
            _ => "max",
        }
    }

    /// Turn one chart payload into close observations inside `range`.
    fn closes(symbol: &str, data: ChartData, range: DateRange) -> Result<Vec<Observation>, DataError> {
        let timestamps = data
            .timestamp
            .ok_or_else(|| DataError::ResponseFormatChanged(format!("no timestamps for {symbol}")))?;

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged(format!("no quote data for {symbol}")))?;

        let mut out = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}")))?;

            // Holidays come back as nulls.
            let Some(close) = quote.close.get(i).copied().flatten() else {
                continue;
            };
            if range.contains(date) {
                out.push(Observation::new(date, close));
            }
        }
        Ok(out)
    }

    fn parse_chart(symbol: &str, body: &str, range: DateRange) -> Result<FetchResult, DataError> {
        let resp: ChartResponse = serde_json::from_str(body).map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse chart response for {symbol}: {e}"))
        })?;

        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => DataError::SeriesNotFound {
                id: symbol.to_string(),
            },
            Some(err) => DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description)),
            None => DataError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("result array is empty".into()))?;

        let observations = Self::closes(symbol, data, range)?;
        if observations.is_empty() {
            return Err(DataError::SeriesNotFound {
                id: symbol.to_string(),
            });
        }
        Ok(FetchResult::new(symbol, Source::Yahoo, observations))
    }

    /// Parse a spark payload. Symbols absent from the payload are reported
    /// as `SeriesNotFound`.
    fn parse_spark(symbols: &[&str], body: &str, range: DateRange) -> Result<BatchFetch, DataError> {
        let resp: SparkResponse = serde_json::from_str(body)
            .map_err(|e| DataError::ResponseFormatChanged(format!("failed to parse spark response: {e}")))?;

        let mut found: BTreeMap<String, ChartData> = BTreeMap::new();
        for entry in resp.spark.result.unwrap_or_default() {
            if let Some(data) = entry.response.into_iter().next() {
                found.insert(entry.symbol, data);
            }
        }

        let mut out = BatchFetch::new();
        for &symbol in symbols {
            let result = match found.remove(symbol) {
                Some(data) => Self::closes(symbol, data, range).and_then(|obs| {
                    if obs.is_empty() {
                        Err(DataError::SeriesNotFound {
                            id: symbol.to_string(),
                        })
                    } else {
                        Ok(FetchResult::new(symbol, Source::Yahoo, obs))
                    }
                }),
                None => Err(DataError::SeriesNotFound {
                    id: symbol.to_string(),
                }),
            };
            out.insert(symbol.to_string(), result);
        }
        Ok(out)
    }

    fn fetch_spark(&self, symbols: &[&str], range: DateRange) -> Result<BatchFetch, DataError> {
        let url = format!("{}/v7/finance/spark", self.base_url);
        let query = [
            ("symbols", symbols.join(",")),
            ("range", Self::spark_range(range).to_string()),
            ("interval", "1d".to_string()),
        ];
        let body = get_text(
            &self.client,
            &self.circuit_breaker,
            &self.settings,
            &url,
            &query,
            "spark",
        )?;
        Self::parse_spark(symbols, &body, range)
    }
}

impl SeriesProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn source(&self) -> Source {
        Source::Yahoo
    }

    fn fetch(&self, symbol: &str, range: DateRange) -> Result<FetchResult, DataError> {
        let start_ts = range.start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        let end_ts = range
            .end
            .and_hms_opt(23, 59, 59)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(start_ts);
        let url = format!("{}/v8/finance/chart/{symbol}", self.base_url);
        let query = [
            ("period1", start_ts.to_string()),
            ("period2", end_ts.to_string()),
            ("interval", "1d".to_string()),
        ];
        let body = get_text(
            &self.client,
            &self.circuit_breaker,
            &self.settings,
            &url,
            &query,
            symbol,
        )?;
        Self::parse_chart(symbol, &body, range)
    }

    fn fetch_batch(&self, symbols: &[&str], range: DateRange) -> BatchFetch {
        let mut out = BatchFetch::new();
        for chunk in symbols.chunks(SPARK_CHUNK) {
            match self.fetch_spark(chunk, range) {
                Ok(results) => out.extend(results),
                Err(DataError::CircuitBreakerTripped) => {
                    for &symbol in chunk {
                        out.insert(symbol.to_string(), Err(DataError::CircuitBreakerTripped));
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "spark request failed, falling back to chart requests");
                    for &symbol in chunk {
                        out.insert(symbol.to_string(), self.fetch(symbol, range));
                    }
                }
            }
        }
        out
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    // 2024-01-02 and 2024-01-03 at 14:30 UTC
    const T1: i64 = 1_704_205_800;
    const T2: i64 = 1_704_292_200;

    #[test]
    fn chart_skips_null_closes() {
        let body = format!(
            r#"{{"chart":{{"result":[{{"timestamp":[{T1},{T2}],
                "indicators":{{"quote":[{{"close":[4742.8,null]}}]}}}}],"error":null}}}}"#
        );
        let range = DateRange::new(d("2024-01-01"), d("2024-01-31"));
        let r = YahooProvider::parse_chart("^GSPC", &body, range).unwrap();
        assert_eq!(r.observations.len(), 1);
        assert_eq!(r.observation_date, Some(d("2024-01-02")));
    }

    #[test]
    fn chart_not_found_maps_to_series_not_found() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#;
        let range = DateRange::new(d("2024-01-01"), d("2024-01-31"));
        let err = YahooProvider::parse_chart("NOPE", body, range).unwrap_err();
        assert!(matches!(err, DataError::SeriesNotFound { .. }));
    }

    #[test]
    fn spark_reports_missing_symbols_individually() {
        let body = format!(
            r#"{{"spark":{{"result":[{{"symbol":"^VIX","response":[{{"timestamp":[{T1},{T2}],
                "indicators":{{"quote":[{{"close":[13.2,14.0]}}]}}}}]}}],"error":null}}}}"#
        );
        let range = DateRange::new(d("2024-01-01"), d("2024-01-31"));
        let out = YahooProvider::parse_spark(&["^VIX", "GC=F"], &body, range).unwrap();
        assert_eq!(out["^VIX"].as_ref().unwrap().observations.len(), 2);
        assert!(matches!(out["GC=F"], Err(DataError::SeriesNotFound { .. })));
    }

    #[test]
    fn spark_range_covers_window() {
        let r = DateRange::lookback(d("2024-12-31"), 5);
        assert_eq!(YahooProvider::spark_range(r), "5y");
        let r = DateRange::new(d("2024-12-01"), d("2024-12-31"));
        assert_eq!(YahooProvider::spark_range(r), "1mo");
    }
}
