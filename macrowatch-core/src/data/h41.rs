//! Federal Reserve H.4.1 release scraper.
//!
//! The page is fetched once per batch. Each source id is a row matcher of
//! the form `contains!exclude1!exclude2`: the first table row whose label
//! cell contains `contains` (case-insensitive) and none of the exclusions
//! wins, and its value is read from the row's last cell. A page without a
//! matching row, a numeric last cell or a report date yields an empty
//! result, never an error.

use super::circuit_breaker::CircuitBreaker;
use super::http::{build_client, get_text, HttpSettings};
use super::provider::{BatchFetch, DataError, DateRange, FetchResult, Observation, SeriesProvider};
use crate::registry::Source;
use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::{Arc, OnceLock};

pub const H41_URL: &str = "https://www.federalreserve.gov/releases/h41/current/default.htm";

/// Row selection rule parsed from a source id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMatcher {
    pub contains: String,
    pub excludes: Vec<String>,
}

impl RowMatcher {
    pub fn parse(source_id: &str) -> Result<Self, DataError> {
        let mut parts = source_id.split('!').map(|p| p.trim().to_lowercase());
        let contains = parts.next().unwrap_or_default();
        if contains.is_empty() {
            return Err(DataError::InvalidSourceId {
                id: source_id.to_string(),
                reason: "empty row label".into(),
            });
        }
        Ok(Self {
            contains,
            excludes: parts.filter(|p| !p.is_empty()).collect(),
        })
    }

    pub fn matches(&self, label: &str) -> bool {
        let label = normalize_ws(label).to_lowercase();
        label.contains(&self.contains) && !self.excludes.iter().any(|x| label.contains(x))
    }
}

/// Value scraped from the release page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrapedValue {
    pub value: f64,
    pub report_date: NaiveDate,
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn report_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)week\s+ended\s*:?\s*(?:[a-z]+day,?\s+)?([a-z]+)\.?\s+(\d{1,2}),?\s+(\d{4})")
            .expect("report date pattern compiles")
    })
}

/// Find the "Week ended <Month> <Day>, <Year>" date in page text.
pub fn parse_report_date(text: &str) -> Option<NaiveDate> {
    let caps = report_date_regex().captures(text)?;
    let month = caps.get(1)?.as_str();
    let month = month.get(..3)?;
    let candidate = format!("{month} {} {}", &caps[2], &caps[3]);
    NaiveDate::parse_from_str(&candidate, "%b %d %Y").ok()
}

/// Parse a table cell as a number: commas stripped, parentheses negative.
pub fn parse_cell_number(cell: &str) -> Option<f64> {
    let cleaned: String = cell.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    let (negative, body) = match cleaned.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, cleaned.as_str()),
    };
    let body = body.strip_prefix('+').unwrap_or(body);
    if body.is_empty() || body == "-" {
        return None;
    }
    let v: f64 = body.parse().ok()?;
    if !v.is_finite() {
        return None;
    }
    Some(if negative { -v } else { v })
}

/// Value of the first matching row, from its last cell. `None` when that
/// cell is blank or not a number.
pub fn extract_row_value(document: &Html, matcher: &RowMatcher) -> Option<f64> {
    let tr = Selector::parse("tr").ok()?;
    let cell = Selector::parse("th, td").ok()?;

    for row in document.select(&tr) {
        let cells: Vec<String> = row
            .select(&cell)
            .map(|c| normalize_ws(&c.text().collect::<String>()))
            .collect();
        let Some(label) = cells.first() else {
            continue;
        };
        if !matcher.matches(label) {
            continue;
        }
        if cells.len() < 2 {
            return None;
        }
        return cells.last().and_then(|last| parse_cell_number(last));
    }
    None
}

/// Pure extraction over a page's HTML.
pub fn extract(html: &str, matcher: &RowMatcher) -> Option<ScrapedValue> {
    let document = Html::parse_document(html);
    let text = document.root_element().text().collect::<Vec<_>>().join(" ");
    let report_date = parse_report_date(&text)?;
    let value = extract_row_value(&document, matcher)?;
    Some(ScrapedValue { value, report_date })
}

/// H.4.1 page scraper.
pub struct H41Scraper {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    settings: HttpSettings,
    url: String,
}

impl H41Scraper {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>, settings: HttpSettings) -> Result<Self, DataError> {
        let client = build_client(&settings)?;
        Ok(Self {
            client,
            circuit_breaker,
            settings,
            url: H41_URL.to_string(),
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn scrape(source_id: &str, html: &str) -> Result<FetchResult, DataError> {
        let matcher = RowMatcher::parse(source_id)?;
        match extract(html, &matcher) {
            Some(found) => Ok(FetchResult::new(
                source_id,
                Source::WebScrape,
                vec![Observation::new(found.report_date, found.value)],
            )),
            None => {
                tracing::info!(source_id, "no H.4.1 row matched; treating as not yet updated");
                Ok(FetchResult::empty(source_id, Source::WebScrape))
            }
        }
    }
}

impl SeriesProvider for H41Scraper {
    fn name(&self) -> &str {
        "h41"
    }

    fn source(&self) -> Source {
        Source::WebScrape
    }

    fn fetch(&self, source_id: &str, range: DateRange) -> Result<FetchResult, DataError> {
        self.fetch_batch(&[source_id], range)
            .remove(source_id)
            .unwrap_or_else(|| Ok(FetchResult::empty(source_id, Source::WebScrape)))
    }

    fn fetch_batch(&self, source_ids: &[&str], _range: DateRange) -> BatchFetch {
        let page = get_text(
            &self.client,
            &self.circuit_breaker,
            &self.settings,
            &self.url,
            &[],
            "h41",
        );
        source_ids
            .iter()
            .map(|&id| {
                let result = match &page {
                    Ok(html) => Self::scrape(id, html),
                    Err(e) => Err(e.clone()),
                };
                (id.to_string(), result)
            })
            .collect()
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
