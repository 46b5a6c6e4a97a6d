//! Observed series and the merged indicator table.
//!
//! All fetched series are outer-joined on one ascending date axis. The
//! unmodified table keeps gaps as `None` (needed for honest MoM/YoY deltas);
//! the forward-filled variant carries each last value forward for display.

pub mod derive;
pub mod normalize;

pub use derive::apply_derivations;
pub use normalize::{normalize, rescale, NormalizedTables, RawSeriesMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::data::Observation;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("column '{column}' has {found} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("date axis is not strictly ascending")]
    UnsortedDates,
}

/// A named, date-sorted, de-duplicated sequence of observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    points: Vec<(NaiveDate, f64)>,
}

impl Series {
    /// Sort by date, keep the last value per date, drop non-finite values.
    pub fn new(name: impl Into<String>, points: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        let by_date: BTreeMap<NaiveDate, f64> = points.into_iter().filter(|(_, v)| v.is_finite()).collect();
        Self {
            name: name.into(),
            points: by_date.into_iter().collect(),
        }
    }

    pub fn from_observations(name: impl Into<String>, observations: &[Observation]) -> Self {
        Self::new(name, observations.iter().map(|o| (o.date, o.value)))
    }

    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<(NaiveDate, f64)> {
        self.points.last().copied()
    }

    /// Multiply every value by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            name: self.name.clone(),
            points: self.points.iter().map(|&(d, v)| (d, v * factor)).collect(),
        }
    }
}

/// One indicator column aligned to the table's date axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Outer-joined table: one ascending date axis, one column per indicator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedTable {
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
}

impl MergedTable {
    /// Outer join of `series` on date. Columns keep the input order.
    pub fn from_series(series: &[Series]) -> Self {
        let dates: Vec<NaiveDate> = series
            .iter()
            .flat_map(|s| s.points.iter().map(|(d, _)| *d))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let columns = series
            .iter()
            .map(|s| {
                let lookup: BTreeMap<NaiveDate, f64> = s.points.iter().copied().collect();
                Column {
                    name: s.name.clone(),
                    values: dates.iter().map(|d| lookup.get(d).copied()).collect(),
                }
            })
            .collect();

        Self { dates, columns }
    }

    /// Assemble a table from already-aligned parts.
    pub fn from_parts(dates: Vec<NaiveDate>, columns: Vec<Column>) -> Result<Self, TableError> {
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TableError::UnsortedDates);
        }
        let mut table = Self {
            dates,
            columns: Vec::with_capacity(columns.len()),
        };
        for col in columns {
            table.push_column(col.name, col.values)?;
        }
        Ok(table)
    }

    /// Append a column aligned to the existing date axis.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Result<(), TableError> {
        let name = name.into();
        if values.len() != self.dates.len() {
            return Err(TableError::LengthMismatch {
                column: name,
                expected: self.dates.len(),
                found: values.len(),
            });
        }
        if self.has_column(&name) {
            return Err(TableError::DuplicateColumn(name));
        }
        self.columns.push(Column { name, values });
        Ok(())
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Value of `name` at exactly `date`.
    pub fn get(&self, name: &str, date: NaiveDate) -> Option<f64> {
        let row = self.dates.binary_search(&date).ok()?;
        self.column(name)?.get(row).copied().flatten()
    }

    /// The non-empty values of a column as a series.
    pub fn series(&self, name: &str) -> Option<Series> {
        let values = self.column(name)?;
        Some(Series {
            name: name.to_string(),
            points: self
                .dates
                .iter()
                .zip(values)
                .filter_map(|(d, v)| v.map(|v| (*d, v)))
                .collect(),
        })
    }

    /// Latest non-empty value of a column.
    pub fn latest(&self, name: &str) -> Option<(NaiveDate, f64)> {
        let values = self.column(name)?;
        self.dates
            .iter()
            .zip(values)
            .rev()
            .find_map(|(d, v)| v.map(|v| (*d, v)))
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// A table with no columns carries nothing worth caching.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Display variant: every gap takes the last earlier value of its column.
    /// Leading gaps stay empty.
    pub fn forward_filled(&self) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let mut last = None;
                let values = c
                    .values
                    .iter()
                    .map(|v| {
                        if v.is_some() {
                            last = *v;
                        }
                        last
                    })
                    .collect();
                Column {
                    name: c.name.clone(),
                    values,
                }
            })
            .collect();
        Self {
            dates: self.dates.clone(),
            columns,
        }
    }

    /// Date of the last non-empty value per column. Columns with no values
    /// are omitted.
    pub fn last_valid_dates(&self) -> BTreeMap<String, NaiveDate> {
        self.columns
            .iter()
            .filter_map(|c| self.latest(&c.name).map(|(d, _)| (c.name.clone(), d)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn outer_join_leaves_gaps() {
        let a = Series::new("a", vec![(d("2024-01-02"), 1.0), (d("2024-01-03"), 2.0)]);
        let b = Series::new("b", vec![(d("2024-01-01"), 10.0), (d("2024-01-03"), 30.0)]);
        let t = MergedTable::from_series(&[a, b]);

        assert_eq!(t.len(), 3);
        assert_eq!(t.column("a").unwrap(), &[None, Some(1.0), Some(2.0)]);
        assert_eq!(t.column("b").unwrap(), &[Some(10.0), None, Some(30.0)]);
        assert_eq!(t.column_names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn forward_fill_keeps_leading_gap() {
        let a = Series::new("a", vec![(d("2024-01-02"), 1.0)]);
        let b = Series::new("b", vec![(d("2024-01-01"), 10.0), (d("2024-01-04"), 40.0)]);
        let filled = MergedTable::from_series(&[a, b]).forward_filled();

        assert_eq!(filled.column("a").unwrap(), &[None, Some(1.0), Some(1.0)]);
        assert_eq!(filled.column("b").unwrap(), &[Some(10.0), Some(10.0), Some(40.0)]);
    }

    #[test]
    fn last_valid_dates_ignore_trailing_gaps() {
        let a = Series::new("a", vec![(d("2024-01-02"), 1.0)]);
        let b = Series::new("b", vec![(d("2024-01-05"), 2.0)]);
        let t = MergedTable::from_series(&[a, b]);
        let lv = t.last_valid_dates();
        assert_eq!(lv["a"], d("2024-01-02"));
        assert_eq!(lv["b"], d("2024-01-05"));
    }

    #[test]
    fn push_column_rejects_misaligned_or_duplicate() {
        let mut t = MergedTable::from_series(&[Series::new("a", vec![(d("2024-01-02"), 1.0)])]);
        assert!(matches!(
            t.push_column("b", vec![]),
            Err(TableError::LengthMismatch { .. })
        ));
        assert!(matches!(
            t.push_column("a", vec![None]),
            Err(TableError::DuplicateColumn(_))
        ));
    }

    #[test]
    fn from_parts_rejects_unsorted_axis() {
        let err = MergedTable::from_parts(vec![d("2024-01-02"), d("2024-01-01")], vec![]).unwrap_err();
        assert_eq!(err, TableError::UnsortedDates);
    }

    // ── Property: a single series survives the merge exactly ──

    fn arb_series() -> impl Strategy<Value = Series> {
        prop::collection::btree_map(0i64..2000, -1e9f64..1e9, 0..60).prop_map(|m| {
            let base = d("2000-01-01");
            Series::new("x", m.into_iter().map(|(off, v)| (base + chrono::Duration::days(off), v)))
        })
    }

    proptest! {
        #[test]
        fn single_column_merge_round_trips(s in arb_series()) {
            let t = MergedTable::from_series(std::slice::from_ref(&s));
            prop_assert_eq!(t.len(), s.len());
            prop_assert_eq!(t.series("x").unwrap(), s);
        }
    }
}
