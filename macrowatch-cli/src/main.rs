//! Macrowatch CLI: refresh, inspect and export the macro indicator snapshot.
//!
//! Commands:
//! - `refresh`: run the fetch pipeline unless the cached snapshot is fresh
//! - `status`: freshness of every indicator and the overall health score
//! - `show`: latest value and MoM/YoY change for one indicator
//! - `live`: poll the JSON API indicators and update the live fetch log
//! - `export`: write the cached table (or per-indicator summaries) as CSV
//! - `indicators`: list the registry
//! - `cache status` / `cache clear`: inspect or remove the snapshot

use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use macrowatch_core::data::{CircuitBreaker, JsonApiProvider};
use macrowatch_core::freshness::{classify, FreshnessStatus, LiveFetchLog};
use macrowatch_core::registry::{Category, Registry, Source};
use macrowatch_core::summary::summarize;
use macrowatch_runner::{
    export_report_json, export_summaries_csv, poll_live, run_pipeline, save_table_csv, ApiKeys, CacheOutcome,
    MonitorConfig, Providers, SnapshotCache,
};

#[derive(Parser)]
#[command(name = "macrowatch", about = "Macrowatch: macro liquidity and markets monitor")]
struct Cli {
    /// Path to the TOML config file. A missing file means defaults.
    #[arg(long, global = true, default_value = "macrowatch.toml")]
    config: PathBuf,

    /// Log level when neither MACROWATCH_LOG nor RUST_LOG is set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh the snapshot if the cached one is older than the TTL.
    Refresh {
        /// Ignore the cached snapshot and refetch everything.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Show freshness per indicator and the overall health score.
    Status {
        /// Print the report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show the latest value and changes for one indicator.
    Show {
        /// Indicator name (see `indicators`).
        name: String,
    },
    /// Poll the live JSON API indicators.
    Live,
    /// Export the cached table as CSV.
    Export {
        /// Output file.
        #[arg(long)]
        output: PathBuf,

        /// Export the unmodified table instead of the forward-filled one.
        #[arg(long, default_value_t = false)]
        raw: bool,

        /// Export one summary row per indicator instead of the table.
        #[arg(long, default_value_t = false, conflicts_with = "raw")]
        summary: bool,
    },
    /// List registry indicators.
    Indicators {
        /// Only this category (e.g. liquidity, rates, crypto).
        #[arg(long)]
        category: Option<Category>,

        /// Only this source (fred, yahoo, web_scrape, api, derived).
        #[arg(long)]
        source: Option<Source>,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report what is cached, its age and size.
    Status,
    /// Remove the cached snapshot.
    Clear,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = MonitorConfig::load_or_default(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    let registry = config.load_registry()?;
    tracing::debug!(indicators = registry.len(), "registry loaded");

    match cli.command {
        Commands::Refresh { force } => run_refresh(&config, &registry, force),
        Commands::Status { json } => run_status(&config, &registry, json),
        Commands::Show { name } => run_show(&config, &registry, &name),
        Commands::Live => run_live(&config, &registry),
        Commands::Export { output, raw, summary } => run_export(&config, &registry, &output, raw, summary),
        Commands::Indicators { category, source } => {
            run_indicators(&registry, category, source);
            Ok(())
        }
        Commands::Cache { action } => match action {
            CacheAction::Status => run_cache_status(&config),
            CacheAction::Clear => run_cache_clear(&config),
        },
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_env("MACROWATCH_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| {
            format!("macrowatch={level},macrowatch_core={level},macrowatch_runner={level}").into()
        });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_refresh(config: &MonitorConfig, registry: &Registry, force: bool) -> Result<()> {
    let keys = ApiKeys::from_env();
    let fred_key = keys.require_fred(registry)?;
    let providers = Providers::live(fred_key, &config.http)?;
    let cache = SnapshotCache::new(&config.cache.dir);
    let today = Local::now().date_naive();

    let outcome = cache.get_or_fetch(config.cache.ttl(), force, Utc::now(), || {
        run_pipeline(registry, &providers, &config.fetch, today, Utc::now())
    })?;

    let snap = outcome.snapshot();
    match &outcome {
        CacheOutcome::Hit(_) => println!(
            "Cached snapshot is fresh ({} min old); use --force to refetch.",
            snap.meta.age(Utc::now()).num_minutes()
        ),
        CacheOutcome::Refreshed { persisted: true, .. } => println!("Snapshot refreshed and cached."),
        CacheOutcome::Refreshed { persisted: false, .. } => println!("Snapshot refreshed but NOT cached."),
    }
    println!("Rows:     {}", snap.meta.rows);
    println!("Columns:  {}", snap.meta.columns.len());
    println!("Failures: {}", snap.meta.failures.len());
    for f in &snap.meta.failures {
        println!("  {:<26} {:<10} {}", f.indicator, f.source, f.error);
    }
    Ok(())
}

fn run_status(config: &MonitorConfig, registry: &Registry, json: bool) -> Result<()> {
    let cache = SnapshotCache::new(&config.cache.dir);
    let meta = cache.verified_meta();
    let live_log = LiveFetchLog::load(&config.live_log_path());
    let today = Local::now().date_naive();

    let last_valid_dates = match &meta {
        Some(m) => m.last_valid_dates.clone(),
        None => {
            tracing::warn!("no cached snapshot; run `macrowatch refresh` first");
            BTreeMap::new()
        }
    };
    let report = classify(registry, &last_valid_dates, &live_log, &config.freshness, today);
    if json {
        println!("{}", export_report_json(&report)?);
        return Ok(());
    }

    if let Some(m) = &meta {
        println!("Snapshot: {} ({} min old)", m.created_at, m.age(Utc::now()).num_minutes());
    }
    println!(
        "Health:   {:.1}%  ({} fresh, {} stale, {} critical, {} missing)",
        report.health_score, report.fresh, report.stale, report.critical, report.missing
    );
    println!();
    println!("{:<26} {:<10} {:<12} {:>6}", "Indicator", "Status", "Last", "Days");
    println!("{}", "-".repeat(57));
    for (name, record) in &report.details {
        let last = record.last_date.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
        let days = record.days_old.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
        println!("{:<26} {:<10} {:<12} {:>6}", name, record.status, last, days);
    }

    if report.worst() >= Some(FreshnessStatus::Critical) {
        tracing::warn!(critical = report.critical, missing = report.missing, "indicators need attention");
    }
    Ok(())
}

fn run_show(config: &MonitorConfig, registry: &Registry, name: &str) -> Result<()> {
    let def = registry.lookup(name)?;
    let cache = SnapshotCache::new(&config.cache.dir);
    let snap = cache
        .load_cached()
        .context("no usable cached snapshot; run `macrowatch refresh` first")?;

    println!("{} ({})", def.label, def.name);
    println!("Source:   {} {:?}", def.source, def.source_ids);
    println!("Unit:     {}", def.unit.label);
    println!("Pattern:  {}", def.display_pattern.as_str());

    let Some(summary) = summarize(def, &snap.raw) else {
        println!("No observations in the cached snapshot.");
        return Ok(());
    };
    println!("Latest:   {:.4} on {}", summary.latest, summary.latest_date);
    if let (Some(prev), Some(change)) = (summary.previous, summary.change) {
        println!("Previous: {prev:.4} (change {change:+.4})");
    }
    if let Some(mom) = summary.mom_pct {
        println!("MoM:      {mom:+.2}%");
    }
    if let Some(yoy) = summary.yoy_pct {
        println!("YoY:      {yoy:+.2}%");
    }
    Ok(())
}

fn run_live(config: &MonitorConfig, registry: &Registry) -> Result<()> {
    let provider = JsonApiProvider::new(Arc::new(CircuitBreaker::default_provider()), config.http.clone())?;
    let log_path = config.live_log_path();
    let mut log = LiveFetchLog::load(&log_path);
    let today = Local::now().date_naive();

    let poll = poll_live(registry, &provider, &mut log, today);
    log.save(&log_path)
        .with_context(|| format!("failed to save live fetch log {}", log_path.display()))?;

    for (name, v) in &poll.values {
        let unit = registry.lookup(name).map(|d| d.unit.label.as_str()).unwrap_or("");
        println!("{:<22} {:>18.4} {:<8} ({})", name, v.value, unit, v.date);
    }
    for f in &poll.failures {
        println!("{:<22} FAILED: {}", f.indicator, f.error);
    }
    if poll.values.is_empty() && !poll.failures.is_empty() {
        bail!("every live indicator failed");
    }
    Ok(())
}

fn run_export(config: &MonitorConfig, registry: &Registry, output: &Path, raw: bool, summary: bool) -> Result<()> {
    let cache = SnapshotCache::new(&config.cache.dir);
    let snap = cache
        .load_cached()
        .context("no usable cached snapshot; run `macrowatch refresh` first")?;

    if summary {
        let summaries: Vec<_> = registry.iter().filter_map(|def| summarize(def, &snap.raw)).collect();
        std::fs::write(output, export_summaries_csv(&summaries)?)
            .with_context(|| format!("failed to write {}", output.display()))?;
        println!("Wrote {} summaries to {}", summaries.len(), output.display());
        return Ok(());
    }

    let table = if raw { &snap.raw } else { &snap.filled };
    save_table_csv(table, output)?;
    println!(
        "Wrote {} rows x {} columns to {}",
        table.len(),
        table.width(),
        output.display()
    );
    Ok(())
}

fn run_indicators(registry: &Registry, category: Option<Category>, source: Option<Source>) {
    let defs = registry.list_by(|d| {
        category.map_or(true, |c| d.category == c) && source.map_or(true, |s| d.source == s)
    });
    println!("{:<26} {:<10} {:<10} {:<10} {}", "Name", "Category", "Source", "Frequency", "Label");
    println!("{}", "-".repeat(80));
    for d in &defs {
        println!(
            "{:<26} {:<10} {:<10} {:<10} {}",
            d.name, d.category, d.source, d.frequency, d.label
        );
    }
    println!("{} indicator(s)", defs.len());
}

fn run_cache_status(config: &MonitorConfig) -> Result<()> {
    let status = SnapshotCache::new(&config.cache.dir).status();
    println!("Cache: {}", status.cache_dir.display());
    println!("Total size: {}", format_size(status.size_bytes));
    if status.quarantined > 0 {
        println!("Quarantined files: {}", status.quarantined);
    }
    match status.meta {
        Some(meta) => {
            let age = meta.age(Utc::now());
            let state = if age < config.cache.ttl() { "fresh" } else { "expired" };
            println!("Snapshot: {} ({} min old, {state})", meta.created_at, age.num_minutes());
            println!("Rows: {}  Columns: {}  Failures: {}", meta.rows, meta.columns.len(), meta.failures.len());
            println!("Schema: v{}  Hash: {}", meta.schema_version, meta.data_hash);
        }
        None => println!("Snapshot: none"),
    }
    Ok(())
}

fn run_cache_clear(config: &MonitorConfig) -> Result<()> {
    let removed = SnapshotCache::new(&config.cache.dir).clear()?;
    println!("Removed {removed} file(s) from {}", config.cache.dir.display());
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
