//! Live polling of `Api` indicators.
//!
//! These series are point-in-time readings (funding rate, open interest,
//! stablecoin supply) and are not part of the cached snapshot. Each
//! successful poll is recorded in the [`LiveFetchLog`], which the freshness
//! classifier reads in place of a last valid date.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use macrowatch_core::cache::FetchFailure;
use macrowatch_core::data::{BatchFetch, DateRange, SeriesProvider};
use macrowatch_core::freshness::LiveFetchLog;
use macrowatch_core::registry::{Registry, Source};

use crate::fetch::fetch_first_available;

/// Latest rescaled reading of one live indicator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LiveValue {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LivePoll {
    pub values: BTreeMap<String, LiveValue>,
    pub failures: Vec<FetchFailure>,
}

/// Poll every `Api` indicator once.
///
/// Successes are logged under `today`, the day the fetch happened, not the
/// upstream timestamp.
pub fn poll_live(
    registry: &Registry,
    provider: &dyn SeriesProvider,
    log: &mut LiveFetchLog,
    today: NaiveDate,
) -> LivePoll {
    let range = DateRange::new(today, today);
    let no_batch = BatchFetch::new();
    let mut poll = LivePoll::default();

    for def in registry.by_source(Source::Api) {
        let result = if provider.is_available() {
            fetch_first_available(provider, &def.source_ids, range, &no_batch)
        } else {
            Err(macrowatch_core::data::DataError::CircuitBreakerTripped)
        };

        match result {
            Ok(r) => match r.latest() {
                Some(obs) => {
                    log.record_success(&def.name, today);
                    poll.values.insert(
                        def.name.clone(),
                        LiveValue {
                            date: obs.date,
                            value: obs.value * def.unit.factor,
                        },
                    );
                }
                None => tracing::info!(indicator = %def.name, "live endpoint returned nothing"),
            },
            Err(e) => {
                tracing::warn!(indicator = %def.name, error = %e, "live fetch failed");
                poll.failures.push(FetchFailure {
                    indicator: def.name.clone(),
                    source: def.source.to_string(),
                    tried: def.source_ids.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(ok = poll.values.len(), failed = poll.failures.len(), "live poll complete");
    poll
}
