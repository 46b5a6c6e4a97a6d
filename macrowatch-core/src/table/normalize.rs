//! Unit rescaling and merge of fetched series into the two table variants.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::derive::apply_derivations;
use super::{MergedTable, Series};
use crate::data::FetchResult;
use crate::registry::Registry;

/// Fetched results keyed by indicator name.
pub type RawSeriesMap = BTreeMap<String, FetchResult>;

/// Multiply every value of `series` by `factor`.
pub fn rescale(series: &Series, factor: f64) -> Series {
    if factor == 1.0 {
        return series.clone();
    }
    series.scaled(factor)
}

/// Output of normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedTables {
    /// Unmodified merge plus derived columns; used for deltas.
    pub raw: MergedTable,
    /// Forward-filled display variant of `raw`.
    pub filled: MergedTable,
    pub last_valid_dates: BTreeMap<String, NaiveDate>,
}

/// Rescale each fetched series by its unit factor, merge them in registry
/// order, apply derivations and build the forward-filled variant.
///
/// Entries that are empty or unknown to the registry are left out.
pub fn normalize(raw_series: &RawSeriesMap, registry: &Registry) -> NormalizedTables {
    let mut series = Vec::with_capacity(raw_series.len());

    for def in registry.iter().filter(|d| !d.is_derived()) {
        let Some(fetched) = raw_series.get(&def.name) else {
            continue;
        };
        if fetched.is_empty() {
            continue;
        }
        let s = Series::from_observations(def.name.as_str(), &fetched.observations);
        series.push(rescale(&s, def.unit.factor));
    }

    for name in raw_series.keys() {
        if !registry.contains(name) {
            tracing::debug!(indicator = %name, "dropping series not in registry");
        }
    }

    let mut raw = MergedTable::from_series(&series);
    apply_derivations(&mut raw, registry);
    let filled = raw.forward_filled();
    let last_valid_dates = raw.last_valid_dates();

    NormalizedTables {
        raw,
        filled,
        last_valid_dates,
    }
}
