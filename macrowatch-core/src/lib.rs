//! Macrowatch core: indicator registry, source adapters, tables, freshness.
//!
//! This crate contains everything that does not need a process around it:
//! - The typed indicator registry and built-in catalog
//! - Source adapters (FRED, Yahoo Finance, JSON REST, H.4.1 scrape)
//! - Unit normalization, outer-join merge and derived columns
//! - Freshness classification and health score
//! - MoM/YoY summaries
//! - Parquet snapshot persistence

pub mod cache;
pub mod data;
pub mod freshness;
pub mod registry;
pub mod summary;
pub mod table;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything handed to worker threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<registry::Registry>();
        require_sync::<registry::Registry>();
        require_send::<registry::IndicatorDef>();
        require_sync::<registry::IndicatorDef>();

        require_send::<data::FetchResult>();
        require_sync::<data::FetchResult>();
        require_send::<data::DataError>();
        require_sync::<data::DataError>();
        require_send::<data::CircuitBreaker>();
        require_sync::<data::CircuitBreaker>();
        require_send::<data::FredProvider>();
        require_sync::<data::FredProvider>();
        require_send::<data::YahooProvider>();
        require_sync::<data::YahooProvider>();
        require_send::<data::JsonApiProvider>();
        require_sync::<data::JsonApiProvider>();
        require_send::<data::H41Scraper>();
        require_sync::<data::H41Scraper>();

        require_send::<table::MergedTable>();
        require_sync::<table::MergedTable>();
        require_send::<cache::Snapshot>();
        require_sync::<cache::Snapshot>();
        require_send::<freshness::FreshnessReport>();
        require_sync::<freshness::FreshnessReport>();
    }

    /// Providers are usable as trait objects shared across the worker pool.
    #[test]
    fn providers_are_object_safe() {
        fn _takes(_p: &dyn data::SeriesProvider) {}
    }
}
