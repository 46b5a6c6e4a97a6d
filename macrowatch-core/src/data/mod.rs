//! Source adapters: FRED, Yahoo Finance, JSON REST and the H.4.1 page.

pub mod circuit_breaker;
pub mod fred;
pub mod h41;
pub mod http;
pub mod json_api;
pub mod provider;
pub mod yahoo;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use fred::FredProvider;
pub use h41::{H41Scraper, RowMatcher, ScrapedValue};
pub use http::{HttpSettings, MAX_RETRIES};
pub use json_api::{ApiTarget, JsonApiProvider};
pub use provider::{BatchFetch, DataError, DateRange, FetchResult, Observation, SeriesProvider};
pub use yahoo::YahooProvider;
