//! Macrowatch runner: everything between the core library and the CLI.
//!
//! This crate builds on `macrowatch-core` to provide:
//! - TOML configuration and environment secrets
//! - Concurrent fetch orchestration with candidate-id fallback
//! - The fetch → normalize → snapshot pipeline
//! - TTL cache policy over the snapshot store
//! - Live polling of JSON API indicators
//! - CSV and JSON export

pub mod config;
pub mod export;
pub mod fetch;
pub mod live;
pub mod pipeline;
pub mod snapshot;

pub use config::{ApiKeys, CacheConfig, ConfigError, FetchConfig, MonitorConfig, RegistryConfig};
pub use export::{export_report_json, export_summaries_csv, export_table_csv, save_table_csv, write_table_csv};
pub use fetch::{fetch_all, fetch_first_available, FetchOutcome, Providers};
pub use live::{poll_live, LivePoll, LiveValue};
pub use pipeline::{run_pipeline, PipelineError};
pub use snapshot::{CacheOutcome, SnapshotCache};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn providers_are_send_sync() {
        assert_send::<Providers>();
        assert_sync::<Providers>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<MonitorConfig>();
        assert_sync::<MonitorConfig>();
        assert_send::<ApiKeys>();
        assert_sync::<ApiKeys>();
    }

    #[test]
    fn outcomes_are_send_sync() {
        assert_send::<FetchOutcome>();
        assert_sync::<FetchOutcome>();
        assert_send::<CacheOutcome>();
        assert_sync::<CacheOutcome>();
        assert_send::<LivePoll>();
        assert_sync::<LivePoll>();
    }

    #[test]
    fn pipeline_error_is_send_sync() {
        assert_send::<PipelineError>();
        assert_sync::<PipelineError>();
    }
}
