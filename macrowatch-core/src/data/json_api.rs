//! Generic JSON REST poller for live indicators.
//!
//! A source id has the form `URL#<value-pointer>[@<time-pointer>]`. Pointers
//! follow RFC 6901, extended so that a `-` segment selects the last element
//! of an array. Each poll yields a single observation; when there is no time
//! pointer the observation is dated at the end of the requested range.

use super::circuit_breaker::CircuitBreaker;
use super::http::{build_client, get_text, HttpSettings};
use super::provider::{DataError, DateRange, FetchResult, Observation, SeriesProvider};
use crate::registry::Source;
use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use std::sync::Arc;

/// Epoch values above this are taken as milliseconds.
const EPOCH_MILLIS_CUTOFF: f64 = 1e11;

/// A parsed JSON API source id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiTarget {
    pub url: String,
    pub value_pointer: String,
    pub time_pointer: Option<String>,
}

impl ApiTarget {
    pub fn parse(source_id: &str) -> Result<Self, DataError> {
        let invalid = |reason: &str| DataError::InvalidSourceId {
            id: source_id.to_string(),
            reason: reason.to_string(),
        };

        let (url, pointers) = source_id
            .split_once('#')
            .ok_or_else(|| invalid("missing '#<pointer>'"))?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid("url must be http(s)"));
        }

        let (value_pointer, time_pointer) = match pointers.split_once('@') {
            Some((v, t)) => (v, Some(t)),
            None => (pointers, None),
        };
        if !value_pointer.starts_with('/') {
            return Err(invalid("value pointer must start with '/'"));
        }
        if let Some(t) = time_pointer {
            if !t.starts_with('/') {
                return Err(invalid("time pointer must start with '/'"));
            }
        }

        Ok(Self {
            url: url.to_string(),
            value_pointer: value_pointer.to_string(),
            time_pointer: time_pointer.map(str::to_string),
        })
    }
}

/// Resolve a JSON pointer, treating `-` as the last array element.
pub fn resolve_pointer<'a>(doc: &'a Value, pointer: &str) -> Option<&'a Value> {
    if pointer.is_empty() {
        return Some(doc);
    }
    let rest = pointer.strip_prefix('/')?;
    rest.split('/').try_fold(doc, |node, raw| {
        let token = raw.replace("~1", "/").replace("~0", "~");
        match node {
            Value::Object(map) => map.get(&token),
            Value::Array(items) if token == "-" => items.last(),
            Value::Array(items) => token.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    })
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn epoch_to_date(raw: f64) -> Option<NaiveDate> {
    let secs = if raw.abs() > EPOCH_MILLIS_CUTOFF { raw / 1000.0 } else { raw };
    DateTime::from_timestamp(secs as i64, 0).map(|dt| dt.naive_utc().date())
}

/// Interpret a timestamp node: epoch seconds or millis, or an ISO date/datetime.
pub fn parse_time(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => n.as_f64().and_then(epoch_to_date),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<f64>() {
                return epoch_to_date(n);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.naive_utc().date());
            }
            s.get(..10)
                .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        }
        _ => None,
    }
}

/// Extract the observation a target points at from a response document.
pub fn extract_observation(
    target: &ApiTarget,
    doc: &Value,
    default_date: NaiveDate,
) -> Result<Observation, DataError> {
    let node = resolve_pointer(doc, &target.value_pointer).ok_or_else(|| {
        DataError::ResponseFormatChanged(format!("no value at {} in {}", target.value_pointer, target.url))
    })?;
    let value = as_number(node).ok_or_else(|| {
        DataError::ResponseFormatChanged(format!("non-numeric value at {}: {node}", target.value_pointer))
    })?;

    let date = match &target.time_pointer {
        None => default_date,
        Some(ptr) => resolve_pointer(doc, ptr).and_then(parse_time).ok_or_else(|| {
            DataError::ResponseFormatChanged(format!("unreadable timestamp at {ptr} in {}", target.url))
        })?,
    };

    Ok(Observation::new(date, value))
}

/// JSON REST provider.
pub struct JsonApiProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    settings: HttpSettings,
}

impl JsonApiProvider {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>, settings: HttpSettings) -> Result<Self, DataError> {
        let client = build_client(&settings)?;
        Ok(Self {
            client,
            circuit_breaker,
            settings,
        })
    }
}

impl SeriesProvider for JsonApiProvider {
    fn name(&self) -> &str {
        "json_api"
    }

    fn source(&self) -> Source {
        Source::Api
    }

    fn fetch(&self, source_id: &str, range: DateRange) -> Result<FetchResult, DataError> {
        let target = ApiTarget::parse(source_id)?;
        let body = get_text(
            &self.client,
            &self.circuit_breaker,
            &self.settings,
            &target.url,
            &[],
            source_id,
        )?;
        let doc: Value = serde_json::from_str(&body)
            .map_err(|e| DataError::ResponseFormatChanged(format!("invalid JSON from {}: {e}", target.url)))?;
        let obs = extract_observation(&target, &doc, range.end)?;
        Ok(FetchResult::new(source_id, Source::Api, vec![obs]))
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn parses_target_with_time_pointer() {
        let t = ApiTarget::parse("https://x.test/a?s=1#/rate@/time").unwrap();
        assert_eq!(t.url, "https://x.test/a?s=1");
        assert_eq!(t.value_pointer, "/rate");
        assert_eq!(t.time_pointer.as_deref(), Some("/time"));
    }

    #[test]
    fn rejects_malformed_targets() {
        assert!(ApiTarget::parse("https://x.test/a").is_err());
        assert!(ApiTarget::parse("ftp://x.test#/a").is_err());
        assert!(ApiTarget::parse("https://x.test#rate").is_err());
    }

    #[test]
    fn dash_selects_last_element() {
        let doc = json!([{"v": {"usd": 1}}, {"v": {"usd": 2}}]);
        assert_eq!(resolve_pointer(&doc, "/-/v/usd"), Some(&json!(2)));
        assert_eq!(resolve_pointer(&doc, "/0/v/usd"), Some(&json!(1)));
        assert_eq!(resolve_pointer(&doc, "/5/v"), None);
    }

    #[test]
    fn funding_rate_payload() {
        let t = ApiTarget::parse("https://x.test#/lastFundingRate@/time").unwrap();
        let doc = json!({"symbol": "BTCUSDT", "lastFundingRate": "0.00010000", "time": 1_704_205_800_000_i64});
        let obs = extract_observation(&t, &doc, d("2030-01-01")).unwrap();
        assert_eq!(obs.value, 0.0001);
        assert_eq!(obs.date, d("2024-01-02"));
    }

    #[test]
    fn epoch_seconds_as_string() {
        assert_eq!(parse_time(&json!("1704205800")), Some(d("2024-01-02")));
        assert_eq!(parse_time(&json!("2024-03-01T12:00:00Z")), Some(d("2024-03-01")));
        assert_eq!(parse_time(&json!("2024-03-01")), Some(d("2024-03-01")));
        assert_eq!(parse_time(&json!(true)), None);
    }

    #[test]
    fn missing_time_pointer_uses_default_date() {
        let t = ApiTarget::parse("https://x.test#/oi").unwrap();
        let obs = extract_observation(&t, &json!({"oi": 81234.5}), d("2024-05-05")).unwrap();
        assert_eq!(obs.date, d("2024-05-05"));
    }

    #[test]
    fn non_numeric_value_is_format_change() {
        let t = ApiTarget::parse("https://x.test#/oi").unwrap();
        let err = extract_observation(&t, &json!({"oi": "n/a"}), d("2024-05-05")).unwrap_err();
        assert!(matches!(err, DataError::ResponseFormatChanged(_)));
    }
}
