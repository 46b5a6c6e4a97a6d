//! End-to-end: in-memory providers → pipeline → cache → freshness → export.

use chrono::{Duration, NaiveDate, Utc};
use std::collections::BTreeMap;

use macrowatch_core::data::{BatchFetch, DataError, DateRange, FetchResult, Observation, SeriesProvider};
use macrowatch_core::freshness::{classify, FreshnessRules, FreshnessStatus, LiveFetchLog};
use macrowatch_core::registry::{Registry, Source};
use macrowatch_core::summary::summarize;
use macrowatch_runner::{export_table_csv, run_pipeline, FetchConfig, Providers, SnapshotCache};

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Serves fixed observations per upstream id; anything else is not found.
struct Canned {
    source: Source,
    data: BTreeMap<&'static str, Vec<(NaiveDate, f64)>>,
}

impl SeriesProvider for Canned {
    fn name(&self) -> &str {
        "canned"
    }
    fn source(&self) -> Source {
        self.source
    }
    fn fetch(&self, id: &str, _range: DateRange) -> Result<FetchResult, DataError> {
        match self.data.get(id) {
            Some(points) => Ok(FetchResult::new(
                id,
                self.source,
                points.iter().map(|(d, v)| Observation::new(*d, *v)).collect(),
            )),
            None => Err(DataError::SeriesNotFound { id: id.into() }),
        }
    }
    fn fetch_batch(&self, ids: &[&str], range: DateRange) -> BatchFetch {
        ids.iter().map(|id| (id.to_string(), self.fetch(id, range))).collect()
    }
    fn is_available(&self) -> bool {
        true
    }
}

fn providers() -> Providers {
    let weekly = |a: f64, b: f64| vec![(d("2024-01-03"), a), (d("2024-01-10"), b)];
    let fred = Canned {
        source: Source::Fred,
        data: BTreeMap::from([
            ("WALCL", weekly(100_000.0, 102_000.0)),
            ("WTREGEN", weekly(10_000.0, 10_000.0)),
            ("RRPONTSYD", weekly(5.0, 6.0)),
            // Primary id missing upstream; the fallback answers.
            ("TREASBILLS", weekly(200_000.0, 210_000.0)),
            ("TREAST", weekly(4_000_000.0, 4_200_000.0)),
        ]),
    };
    let yahoo = Canned {
        source: Source::Yahoo,
        data: BTreeMap::from([("^VIX", vec![(d("2024-01-09"), 12.5), (d("2024-01-11"), 13.0)])]),
    };
    Providers::new().with(Box::new(fred)).with(Box::new(yahoo))
}

#[test]
fn refresh_cycle_produces_cached_classified_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::builtin();
    let providers = providers();
    let today = d("2024-01-12");
    let cache = SnapshotCache::new(dir.path());

    let outcome = cache
        .get_or_fetch(Duration::minutes(60), false, Utc::now(), || {
            run_pipeline(&registry, &providers, &FetchConfig::default(), today, Utc::now())
        })
        .unwrap();
    assert!(!outcome.is_hit());
    let snap = outcome.into_snapshot();

    // Rescaled inputs and derived columns.
    assert_eq!(snap.raw.get("fed_total_assets", d("2024-01-10")), Some(102.0));
    assert_eq!(snap.raw.get("net_liquidity", d("2024-01-10")), Some(86.0));
    assert_eq!(snap.raw.get("soma_bills", d("2024-01-10")), Some(210.0));
    assert_eq!(snap.raw.get("soma_bills_ratio", d("2024-01-10")), Some(5.0));

    // The unmodified table keeps gaps; the filled one carries values forward.
    assert_eq!(snap.raw.get("fed_total_assets", d("2024-01-11")), None);
    assert_eq!(snap.filled.get("fed_total_assets", d("2024-01-11")), Some(102.0));

    // Served from disk the second time.
    let again = cache
        .get_or_fetch(Duration::minutes(60), false, Utc::now(), || unreachable!("cache should hit"))
        .unwrap();
    assert!(again.is_hit());
    assert_eq!(again.snapshot().raw, snap.raw);

    // Freshness from the metadata alone.
    let report = classify(
        &registry,
        &again.snapshot().meta.last_valid_dates,
        &LiveFetchLog::new(),
        &FreshnessRules::default(),
        today,
    );
    assert_eq!(report.details["fed_total_assets"].status, FreshnessStatus::Fresh);
    assert_eq!(report.details["vix"].status, FreshnessStatus::Fresh);
    assert_eq!(report.details["us10y"].status, FreshnessStatus::Missing);
    assert!(!report.details.contains_key("net_liquidity"));
    assert!(report.health_score > 0.0 && report.health_score < 100.0);

    // Summaries come from the unmodified table.
    let vix = summarize(registry.lookup("vix").unwrap(), &snap.raw).unwrap();
    assert_eq!(vix.latest, 13.0);
    assert_eq!(vix.previous, Some(12.5));

    let csv = export_table_csv(&snap.raw).unwrap();
    assert!(csv.starts_with("date,"));
    assert_eq!(csv.lines().count(), snap.raw.len() + 1);
}

#[test]
fn failures_are_recorded_in_metadata() {
    let registry = Registry::builtin();
    let snap = run_pipeline(&registry, &providers(), &FetchConfig::default(), d("2024-01-12"), Utc::now()).unwrap();

    let soma_bills = snap.meta.failures.iter().find(|f| f.indicator == "soma_bills");
    assert!(soma_bills.is_none(), "fallback id should have answered");

    let gold = snap.meta.failures.iter().find(|f| f.indicator == "gold").unwrap();
    assert_eq!(gold.source, "yahoo");
    assert_eq!(gold.tried, vec!["GC=F".to_string()]);
    assert!(!snap.raw.has_column("gold"));
}
