//! Criterion benchmarks for the normalize path.
//!
//! Benchmarks:
//! 1. Outer-join merge of many series on mismatched calendars
//! 2. Full normalize (rescale, merge, derivations, forward fill) over the
//!    built-in registry

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use macrowatch_core::data::{FetchResult, Observation};
use macrowatch_core::registry::{Frequency, Registry};
use macrowatch_core::table::{normalize, MergedTable, RawSeriesMap, Series};

// ── Helpers ──────────────────────────────────────────────────────────

fn step_days(frequency: Frequency) -> i64 {
    match frequency {
        Frequency::Daily => 1,
        Frequency::Weekly => 7,
        Frequency::Monthly => 30,
        Frequency::Quarterly => 91,
    }
}

fn make_points(n_days: i64, step: i64, offset: i64) -> Vec<(chrono::NaiveDate, f64)> {
    let base = chrono::NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
    (0..n_days / step)
        .map(|i| {
            let day = i * step + offset;
            (base + chrono::Duration::days(day), 100.0 + (day as f64 * 0.01).sin() * 10.0)
        })
        .collect()
}

fn make_raw(registry: &Registry, n_days: i64) -> RawSeriesMap {
    registry
        .iter()
        .filter(|d| !d.is_derived())
        .enumerate()
        .map(|(i, def)| {
            let obs = make_points(n_days, step_days(def.frequency), i as i64 % 3)
                .into_iter()
                .map(|(d, v)| Observation::new(d, v))
                .collect();
            (def.name.clone(), FetchResult::new("bench", def.source, obs))
        })
        .collect()
}

// ── 1. Merge ─────────────────────────────────────────────────────────

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    for n_days in [365_i64, 1825] {
        let series: Vec<Series> = (0..30)
            .map(|i| Series::new(format!("s{i}"), make_points(n_days, 1 + i % 7, i % 3)))
            .collect();
        group.bench_with_input(BenchmarkId::new("30_series", n_days), &series, |b, s| {
            b.iter(|| MergedTable::from_series(black_box(s)))
        });
    }
    group.finish();
}

// ── 2. Normalize ─────────────────────────────────────────────────────

fn bench_normalize(c: &mut Criterion) {
    let registry = Registry::builtin();
    let mut group = c.benchmark_group("normalize");
    for n_days in [365_i64, 1825] {
        let raw = make_raw(&registry, n_days);
        group.bench_with_input(BenchmarkId::new("builtin_registry", n_days), &raw, |b, raw| {
            b.iter(|| normalize(black_box(raw), &registry))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_merge, bench_normalize);
criterion_main!(benches);
