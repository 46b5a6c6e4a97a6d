//! Freshness classification.
//!
//! Each indicator's last valid observation date is compared with the
//! thresholds for its frequency: `days_old ≤ fresh_days` is fresh,
//! `≤ stale_days` is stale, anything older is critical, and no date at all
//! is missing. Live API indicators are judged by their last successful
//! fetch rather than by observation dates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::registry::{Frequency, IndicatorDef, Registry, Source};

/// Freshness status, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessStatus {
    Fresh,
    Stale,
    Critical,
    Missing,
}

impl FreshnessStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FreshnessStatus::Fresh => "fresh",
            FreshnessStatus::Stale => "stale",
            FreshnessStatus::Critical => "critical",
            FreshnessStatus::Missing => "missing",
        }
    }
}

impl fmt::Display for FreshnessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Age limits in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub fresh_days: i64,
    pub stale_days: i64,
}

impl Thresholds {
    pub const fn new(fresh_days: i64, stale_days: i64) -> Self {
        Self {
            fresh_days,
            stale_days,
        }
    }

    pub fn status_for(&self, days_old: i64) -> FreshnessStatus {
        if days_old <= self.fresh_days {
            FreshnessStatus::Fresh
        } else if days_old <= self.stale_days {
            FreshnessStatus::Stale
        } else {
            FreshnessStatus::Critical
        }
    }
}

/// Thresholds per frequency plus per-indicator overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessRules {
    pub by_frequency: BTreeMap<Frequency, Thresholds>,
    pub overrides: BTreeMap<String, Thresholds>,
}

impl Default for FreshnessRules {
    fn default() -> Self {
        let by_frequency = BTreeMap::from([
            (Frequency::Daily, Thresholds::new(3, 7)),
            (Frequency::Weekly, Thresholds::new(7, 21)),
            (Frequency::Monthly, Thresholds::new(45, 75)),
            (Frequency::Quarterly, Thresholds::new(120, 200)),
        ]);
        Self {
            by_frequency,
            overrides: BTreeMap::new(),
        }
    }
}

impl FreshnessRules {
    /// The rule that applies to `def`, if any.
    pub fn for_indicator(&self, def: &IndicatorDef) -> Option<Thresholds> {
        self.overrides
            .get(&def.name)
            .or_else(|| self.by_frequency.get(&def.frequency))
            .copied()
    }
}

/// Last successful live fetch per API indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveFetchLog {
    last_success: BTreeMap<String, NaiveDate>,
}

impl LiveFetchLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a success; the log never moves backwards.
    pub fn record_success(&mut self, name: &str, date: NaiveDate) {
        let entry = self.last_success.entry(name.to_string()).or_insert(date);
        if date > *entry {
            *entry = date;
        }
    }

    pub fn last_success(&self, name: &str) -> Option<NaiveDate> {
        self.last_success.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.last_success.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_success.is_empty()
    }

    /// Load a log; a missing or unreadable file is an empty log.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable live fetch log");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Persist atomically (tmp + rename).
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)
    }
}

/// Freshness of one indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessRecord {
    pub last_date: Option<NaiveDate>,
    pub days_old: Option<i64>,
    pub status: FreshnessStatus,
}

/// Classification of every rule-defined indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessReport {
    pub details: BTreeMap<String, FreshnessRecord>,
    pub fresh: usize,
    pub stale: usize,
    pub critical: usize,
    pub missing: usize,
    pub health_score: f64,
}

impl FreshnessReport {
    pub fn total(&self) -> usize {
        self.fresh + self.stale + self.critical + self.missing
    }

    /// Worst status across all indicators.
    pub fn worst(&self) -> Option<FreshnessStatus> {
        self.details.values().map(|r| r.status).max()
    }
}

/// `fresh / total × 100`, one decimal; zero when nothing is counted.
pub fn health_score(fresh: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (fresh as f64 / total as f64 * 1000.0).round() / 10.0
}

/// Classify one indicator given its last date.
pub fn classify_one(last_date: Option<NaiveDate>, thresholds: Thresholds, today: NaiveDate) -> FreshnessRecord {
    match last_date {
        None => FreshnessRecord {
            last_date: None,
            days_old: None,
            status: FreshnessStatus::Missing,
        },
        Some(date) => {
            let days_old = (today - date).num_days();
            FreshnessRecord {
                last_date: Some(date),
                days_old: Some(days_old),
                status: thresholds.status_for(days_old),
            }
        }
    }
}

/// Classify every registry indicator that has a rule.
///
/// Derived indicators are skipped: their freshness follows their inputs.
pub fn classify(
    registry: &Registry,
    last_valid_dates: &BTreeMap<String, NaiveDate>,
    live_log: &LiveFetchLog,
    rules: &FreshnessRules,
    today: NaiveDate,
) -> FreshnessReport {
    let mut details = BTreeMap::new();
    let (mut fresh, mut stale, mut critical, mut missing) = (0, 0, 0, 0);

    for def in registry.iter() {
        if def.is_derived() {
            continue;
        }
        let Some(thresholds) = rules.for_indicator(def) else {
            continue;
        };
        let last_date = if def.source == Source::Api {
            live_log.last_success(&def.name)
        } else {
            last_valid_dates.get(&def.name).copied()
        };
        let record = classify_one(last_date, thresholds, today);
        match record.status {
            FreshnessStatus::Fresh => fresh += 1,
            FreshnessStatus::Stale => stale += 1,
            FreshnessStatus::Critical => critical += 1,
            FreshnessStatus::Missing => missing += 1,
        }
        details.insert(def.name.clone(), record);
    }

    let total = fresh + stale + critical + missing;
    FreshnessReport {
        details,
        fresh,
        stale,
        critical,
        missing,
        health_score: health_score(fresh, total),
    }
}
