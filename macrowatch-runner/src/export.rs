//! Flat-file exports.
//!
//! - **Table CSV**: `date` then one column per indicator in table order,
//!   empty cell where there is no value
//! - **Summary CSV**: one row per indicator with latest value and MoM/YoY
//! - **Freshness JSON**: the full classification report

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use macrowatch_core::freshness::FreshnessReport;
use macrowatch_core::summary::IndicatorSummary;
use macrowatch_core::table::MergedTable;

fn cell(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

// ─── Table ──────────────────────────────────────────────────────────

/// Write `table` as CSV to `writer`.
pub fn write_table_csv<W: Write>(table: &MergedTable, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec!["date".to_string()];
    header.extend(table.column_names().map(str::to_string));
    wtr.write_record(&header)?;

    for (row, date) in table.dates().iter().enumerate() {
        let mut record = Vec::with_capacity(table.width() + 1);
        record.push(date.to_string());
        record.extend(table.columns().iter().map(|c| cell(c.values[row])));
        wtr.write_record(&record)?;
    }

    wtr.flush().context("failed to flush CSV writer")?;
    Ok(())
}

/// The table as a CSV string.
pub fn export_table_csv(table: &MergedTable) -> Result<String> {
    let mut buf = Vec::new();
    write_table_csv(table, &mut buf)?;
    String::from_utf8(buf).context("CSV output is not valid UTF-8")
}

/// Write the table CSV to `path`, creating parent directories.
pub fn save_table_csv(table: &MergedTable, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create export dir: {}", parent.display()))?;
    }
    let file = std::fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_table_csv(table, std::io::BufWriter::new(file))
}

// ─── Summaries ──────────────────────────────────────────────────────

/// One row per indicator: name, latest_date, latest, change, mom_pct, yoy_pct.
pub fn export_summaries_csv(summaries: &[IndicatorSummary]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["indicator", "latest_date", "latest", "change", "mom_pct", "yoy_pct"])?;
    for s in summaries {
        wtr.write_record([
            s.name.clone(),
            s.latest_date.to_string(),
            s.latest.to_string(),
            cell(s.change),
            cell(s.mom_pct.map(|p| (p * 100.0).round() / 100.0)),
            cell(s.yoy_pct.map(|p| (p * 100.0).round() / 100.0)),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Freshness ──────────────────────────────────────────────────────

/// Serialize a freshness report to pretty JSON.
pub fn export_report_json(report: &FreshnessReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize freshness report to JSON")
}
