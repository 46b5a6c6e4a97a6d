//! Derived columns, evaluated in registry order on the unmodified table.
//!
//! A derived value at date D only reads inputs at D. The one exception is
//! the price index of a `RealIndex` rule, which is carried forward from its
//! latest observation at or before D (monthly CPI against monthly M2 releases
//! on different days).

use super::MergedTable;
use crate::registry::{Derivation, Registry};

/// Evaluate one rule against the table. `None` when an input column is absent.
pub fn evaluate(rule: &Derivation, table: &MergedTable) -> Option<Vec<Option<f64>>> {
    match rule {
        Derivation::Difference {
            minuend,
            subtrahends,
        } => {
            let base = table.column(minuend)?;
            let subs = subtrahends
                .iter()
                .map(|s| table.column(s))
                .collect::<Option<Vec<_>>>()?;
            Some(
                (0..table.len())
                    .map(|row| {
                        subs.iter()
                            .try_fold(base[row]?, |acc, col| col[row].map(|v| acc - v))
                    })
                    .collect(),
            )
        }
        Derivation::Ratio {
            numerator,
            denominator,
            scale,
        } => {
            let num = table.column(numerator)?;
            let den = table.column(denominator)?;
            Some(
                num.iter()
                    .zip(den)
                    .map(|(n, d)| match (n, d) {
                        (Some(n), Some(d)) if *d != 0.0 => Some(n / d * scale),
                        _ => None,
                    })
                    .collect(),
            )
        }
        Derivation::RealIndex {
            nominal,
            price_index,
            base,
        } => {
            let nom = table.column(nominal)?;
            let px = table.column(price_index)?;
            let mut last_px = None;
            Some(
                nom.iter()
                    .zip(px)
                    .map(|(n, p)| {
                        if p.is_some() {
                            last_px = *p;
                        }
                        match (n, last_px) {
                            (Some(n), Some(p)) if p != 0.0 => Some(n / p * base),
                            _ => None,
                        }
                    })
                    .collect(),
            )
        }
    }
}

/// Append every derived column whose inputs are present. Later rules may
/// consume columns produced by earlier ones.
pub fn apply_derivations(table: &mut MergedTable, registry: &Registry) {
    for (name, rule) in registry.derivations() {
        let Some(values) = evaluate(rule, table) else {
            let missing: Vec<&str> = rule.inputs().into_iter().filter(|i| !table.has_column(i)).collect();
            tracing::debug!(indicator = name, ?missing, "skipping derived indicator");
            continue;
        };
        if let Err(e) = table.push_column(name, values) {
            tracing::warn!(indicator = name, error = %e, "could not add derived column");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Series;
    use chrono::NaiveDate;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn series(name: &str, points: &[(&str, f64)]) -> Series {
        Series::new(name, points.iter().map(|(s, v)| (d(s), *v)))
    }

    fn liquidity_table() -> MergedTable {
        MergedTable::from_series(&[
            series("fed_total_assets", &[("2024-01-03", 100.0), ("2024-01-10", 102.0)]),
            series("tga", &[("2024-01-03", 10.0), ("2024-01-10", 10.0)]),
            series("reverse_repo", &[("2024-01-03", 5.0), ("2024-01-10", 6.0)]),
        ])
    }

    #[test]
    fn net_liquidity_scenario() {
        let mut t = liquidity_table();
        apply_derivations(&mut t, &Registry::builtin());
        assert_eq!(t.column("net_liquidity").unwrap(), &[Some(85.0), Some(86.0)]);
    }

    #[test]
    fn net_liquidity_absent_without_reverse_repo() {
        let mut t = MergedTable::from_series(&[
            series("fed_total_assets", &[("2024-01-03", 100.0)]),
            series("tga", &[("2024-01-03", 10.0)]),
        ]);
        apply_derivations(&mut t, &Registry::builtin());
        assert!(!t.has_column("net_liquidity"));
    }

    #[test]
    fn difference_needs_every_input_on_the_same_date() {
        let mut t = MergedTable::from_series(&[
            series("fed_total_assets", &[("2024-01-03", 100.0), ("2024-01-10", 102.0)]),
            series("tga", &[("2024-01-03", 10.0), ("2024-01-10", 10.0)]),
            series("reverse_repo", &[("2024-01-03", 5.0), ("2024-01-09", 6.0)]),
        ]);
        apply_derivations(&mut t, &Registry::builtin());
        let net = t.series("net_liquidity").unwrap();
        assert_eq!(net.points(), &[(d("2024-01-03"), 85.0)]);
    }

    #[test]
    fn ratio_with_zero_denominator_has_no_value() {
        let mut t = MergedTable::from_series(&[
            series("soma_treasuries", &[("2024-01-03", 0.0), ("2024-01-10", 4000.0)]),
            series("soma_bills", &[("2024-01-03", 200.0), ("2024-01-10", 200.0)]),
        ]);
        apply_derivations(&mut t, &Registry::builtin());
        assert_eq!(t.column("soma_bills_ratio").unwrap(), &[None, Some(5.0)]);
    }

    #[test]
    fn real_index_carries_price_index_forward_only() {
        let mut t = MergedTable::from_series(&[
            series("cpi_us", &[("2024-01-01", 200.0), ("2024-03-01", 250.0)]),
            series("m2_us", &[("2023-12-01", 999.0), ("2024-02-01", 400.0), ("2024-03-01", 500.0)]),
        ]);
        apply_derivations(&mut t, &Registry::builtin());
        let real = t.column("real_m2_us").unwrap();
        // 2023-12-01: no price index yet
        assert_eq!(real[0], None);
        // 2024-02-01 uses January CPI, never March
        assert_eq!(real[2], Some(200.0));
        assert_eq!(real[3], Some(200.0));
    }

    #[test]
    fn later_dates_never_change_earlier_values() {
        let mut short = liquidity_table();
        apply_derivations(&mut short, &Registry::builtin());

        let mut long = MergedTable::from_series(&[
            series("fed_total_assets", &[("2024-01-03", 100.0), ("2024-01-10", 102.0), ("2024-01-17", 150.0)]),
            series("tga", &[("2024-01-03", 10.0), ("2024-01-10", 10.0), ("2024-01-17", 1.0)]),
            series("reverse_repo", &[("2024-01-03", 5.0), ("2024-01-10", 6.0), ("2024-01-17", 0.0)]),
        ]);
        apply_derivations(&mut long, &Registry::builtin());

        let a = short.column("net_liquidity").unwrap();
        let b = long.column("net_liquidity").unwrap();
        assert_eq!(&b[..a.len()], a);
    }
}
