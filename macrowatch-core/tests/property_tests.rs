//! Property tests for table and registry invariants.
//!
//! 1. Every indicator has a display pattern from the closed set; names unique
//! 2. Net liquidity equals assets − TGA − reverse repo wherever all three exist
//! 3. Net liquidity is absent whenever any input column is absent
//! 4. Derived values never depend on later observations

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use std::collections::HashSet;

use macrowatch_core::data::{FetchResult, Observation};
use macrowatch_core::registry::{DisplayPattern, Registry, Source};
use macrowatch_core::table::{normalize, MergedTable, RawSeriesMap, Series};

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

// ── Strategies (proptest) ────────────────────────────────────────────

/// Weekly observations with some weeks dropped.
fn arb_weekly(max_weeks: usize) -> impl Strategy<Value = Vec<Option<f64>>> {
    prop::collection::vec(prop::option::weighted(0.8, 1.0..10_000.0_f64), 1..max_weeks)
}

fn fetched(values: &[Option<f64>]) -> FetchResult {
    let obs = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| Observation::new(base() + Duration::weeks(i as i64), v)))
        .collect();
    FetchResult::new("X", Source::Fred, obs)
}

// ── 1. Registry ──────────────────────────────────────────────────────

#[test]
fn builtin_patterns_closed_and_names_unique() {
    let reg = Registry::builtin();
    let mut names = HashSet::new();
    for def in reg.iter() {
        assert!(DisplayPattern::ALL.contains(&def.display_pattern));
        assert!(names.insert(def.name.as_str()));
    }
}

// ── 2–3. Net liquidity ───────────────────────────────────────────────

proptest! {
    #[test]
    fn net_liquidity_is_assets_minus_tga_minus_rrp(
        assets in arb_weekly(30),
        tga in arb_weekly(30),
        rrp in arb_weekly(30),
    ) {
        let reg = Registry::builtin();
        let mut raw = RawSeriesMap::new();
        raw.insert("fed_total_assets".into(), fetched(&assets));
        raw.insert("tga".into(), fetched(&tga));
        raw.insert("reverse_repo".into(), fetched(&rrp));
        let out = normalize(&raw, &reg);

        // An input column exists only if it had at least one value.
        let all_present = ["fed_total_assets", "tga", "reverse_repo"]
            .iter()
            .all(|n| out.raw.has_column(n));
        prop_assert_eq!(out.raw.has_column("net_liquidity"), all_present);

        if all_present {
            for &date in out.raw.dates() {
                let a = out.raw.get("fed_total_assets", date);
                let t = out.raw.get("tga", date);
                let r = out.raw.get("reverse_repo", date);
                let net = out.raw.get("net_liquidity", date);
                match (a, t, r) {
                    (Some(a), Some(t), Some(r)) => {
                        let expected = a - t - r;
                        prop_assert!((net.unwrap() - expected).abs() <= 1e-9 * expected.abs().max(1.0));
                    }
                    _ => prop_assert_eq!(net, None),
                }
            }
        }
    }

    #[test]
    fn net_liquidity_absent_if_any_input_absent(
        assets in arb_weekly(20),
        tga in arb_weekly(20),
        drop in 0usize..3,
    ) {
        let reg = Registry::builtin();
        let mut raw = RawSeriesMap::new();
        let inputs = [("fed_total_assets", &assets), ("tga", &tga), ("reverse_repo", &assets)];
        for (i, (name, values)) in inputs.iter().enumerate() {
            if i != drop {
                raw.insert((*name).to_string(), fetched(values));
            }
        }
        let out = normalize(&raw, &reg);
        prop_assert!(!out.raw.has_column("net_liquidity"));
        prop_assert!(!out.filled.has_column("net_liquidity"));
    }

    // ── 4. No look-ahead ─────────────────────────────────────────────

    #[test]
    fn derived_values_ignore_the_future(
        m2 in arb_weekly(40),
        cpi in arb_weekly(40),
        cut in 1usize..40,
    ) {
        let reg = Registry::builtin();
        let full = {
            let mut raw = RawSeriesMap::new();
            raw.insert("m2_us".into(), fetched(&m2));
            raw.insert("cpi_us".into(), fetched(&cpi));
            normalize(&raw, &reg).raw
        };
        let truncated = {
            let mut raw = RawSeriesMap::new();
            raw.insert("m2_us".into(), fetched(&m2[..cut.min(m2.len())]));
            raw.insert("cpi_us".into(), fetched(&cpi[..cut.min(cpi.len())]));
            normalize(&raw, &reg).raw
        };

        if let Some(short) = truncated.series("real_m2_us") {
            for (date, v) in short.points() {
                prop_assert_eq!(full.get("real_m2_us", *date), Some(*v));
            }
        }
    }
}

#[test]
fn scenario_net_liquidity_85_86() {
    let mut t = MergedTable::from_series(&[
        Series::new("fed_total_assets", vec![(base(), 100.0), (base() + Duration::weeks(1), 102.0)]),
        Series::new("tga", vec![(base(), 10.0), (base() + Duration::weeks(1), 10.0)]),
        Series::new("reverse_repo", vec![(base(), 5.0), (base() + Duration::weeks(1), 6.0)]),
    ]);
    macrowatch_core::table::apply_derivations(&mut t, &Registry::builtin());
    assert_eq!(t.column("net_liquidity").unwrap(), &[Some(85.0), Some(86.0)]);
}
