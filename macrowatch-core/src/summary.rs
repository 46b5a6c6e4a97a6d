//! Latest-value summaries with month-over-month and year-over-year change.
//!
//! Changes are computed from the unmodified table so forward-filled values
//! never pose as fresh observations.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::registry::{Frequency, IndicatorDef};
use crate::table::MergedTable;

/// MoM compares against the latest observation in this window before the
/// latest one, in days.
const MOM_MIN_GAP: i64 = 28;
const MOM_MAX_GAP: i64 = 62;
/// Quarterly series compare against the prior quarter instead.
const QOQ_MIN_GAP: i64 = 80;
const QOQ_MAX_GAP: i64 = 100;
/// YoY accepts an observation this many days either side of one year back.
const YOY_TOLERANCE: i64 = 31;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSummary {
    pub name: String,
    pub latest: f64,
    pub latest_date: NaiveDate,
    /// Previous observation and the change to it.
    pub previous: Option<f64>,
    pub change: Option<f64>,
    pub mom_pct: Option<f64>,
    pub yoy_pct: Option<f64>,
}

fn period_window(frequency: Frequency) -> std::ops::RangeInclusive<i64> {
    match frequency {
        Frequency::Quarterly => QOQ_MIN_GAP..=QOQ_MAX_GAP,
        _ => MOM_MIN_GAP..=MOM_MAX_GAP,
    }
}

fn pct_change(from: f64, to: f64) -> Option<f64> {
    (from != 0.0).then(|| (to - from) / from.abs() * 100.0)
}

/// Summarize one indicator from the unmodified table. `None` when the
/// column is absent or empty.
pub fn summarize(def: &IndicatorDef, raw: &MergedTable) -> Option<IndicatorSummary> {
    let series = raw.series(&def.name)?;
    let points = series.points();
    let &(latest_date, latest) = points.last()?;
    let previous = points.len().checked_sub(2).map(|i| points[i].1);

    let (mom_pct, yoy_pct) = if def.display_pattern.shows_changes() {
        let window = period_window(def.frequency);
        let mom = points
            .iter()
            .rev()
            .find(|(d, _)| window.contains(&(latest_date - *d).num_days()))
            .and_then(|&(_, v)| pct_change(v, latest));

        let year_ago = latest_date - Duration::days(365);
        let yoy = points
            .iter()
            .filter(|(d, _)| (*d - year_ago).num_days().abs() <= YOY_TOLERANCE)
            .min_by_key(|(d, _)| (*d - year_ago).num_days().abs())
            .and_then(|&(_, v)| pct_change(v, latest));

        (mom, yoy)
    } else {
        (None, None)
    };

    Some(IndicatorSummary {
        name: def.name.clone(),
        latest,
        latest_date,
        previous,
        change: previous.map(|p| latest - p),
        mom_pct,
        yoy_pct,
    })
}
