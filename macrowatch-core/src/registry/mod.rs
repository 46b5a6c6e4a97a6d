//! Indicator registry: the static catalog of everything the monitor tracks.
//!
//! Each indicator is one [`IndicatorDef`] with fixed, typed fields: where it
//! comes from, which upstream ids to try (in order), how to rescale it, how
//! often it updates, which page it belongs to and how it is displayed.
//!
//! The registry is built once at startup (either [`Registry::builtin`] or a
//! deployment-time TOML file) and is read-only afterwards.

pub mod builtin;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors from registry construction and lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("indicator not found: {0}")]
    NotFound(String),

    #[error("duplicate indicator name: {0}")]
    DuplicateName(String),

    #[error("invalid indicator '{name}': {reason}")]
    Invalid { name: String, reason: String },

    #[error("registry file: {0}")]
    Parse(String),
}

/// Where an indicator's values come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Primary statistics API (FRED).
    Fred,
    /// Market data API (Yahoo Finance).
    Yahoo,
    /// Scraped HTML report (Fed H.4.1).
    WebScrape,
    /// JSON REST endpoint polled live (crypto derivatives, stablecoins).
    Api,
    /// Computed from other indicators.
    Derived,
}

impl Source {
    pub const ALL: [Source; 5] = [
        Source::Fred,
        Source::Yahoo,
        Source::WebScrape,
        Source::Api,
        Source::Derived,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Fred => "fred",
            Source::Yahoo => "yahoo",
            Source::WebScrape => "web_scrape",
            Source::Api => "api",
            Source::Derived => "derived",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|src| src.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown source '{s}'"))
    }
}

/// Nominal update cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl Frequency {
    pub const ALL: [Frequency; 4] = [
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::Monthly,
        Frequency::Quarterly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Dashboard page an indicator is shown on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Liquidity,
    Rates,
    Inflation,
    Money,
    Labor,
    Growth,
    Markets,
    Crypto,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Liquidity,
        Category::Rates,
        Category::Inflation,
        Category::Money,
        Category::Labor,
        Category::Growth,
        Category::Markets,
        Category::Crypto,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Liquidity => "liquidity",
            Category::Rates => "rates",
            Category::Inflation => "inflation",
            Category::Money => "money",
            Category::Labor => "labor",
            Category::Growth => "growth",
            Category::Markets => "markets",
            Category::Crypto => "crypto",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// How an indicator is presented: which derived quantities and chart
/// elements apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayPattern {
    /// Latest value and a plain line chart.
    Standard,
    /// Latest value plus month-over-month and year-over-year % changes.
    MomYoy,
    /// Value computed by hand from a couple of fetched inputs.
    ManualCalc,
    /// Value scraped from a report page; single point per release.
    WebScrape,
    /// Derived composite series.
    Calculated,
    /// Live API value without a stored history.
    Api,
}

impl DisplayPattern {
    pub const ALL: [DisplayPattern; 6] = [
        DisplayPattern::Standard,
        DisplayPattern::MomYoy,
        DisplayPattern::ManualCalc,
        DisplayPattern::WebScrape,
        DisplayPattern::Calculated,
        DisplayPattern::Api,
    ];

    /// Whether MoM / YoY percentage changes are shown.
    pub fn shows_changes(self) -> bool {
        matches!(self, DisplayPattern::MomYoy)
    }

    /// Whether the indicator has a stored history worth charting.
    pub fn has_chart(self) -> bool {
        !matches!(self, DisplayPattern::Api)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DisplayPattern::Standard => "standard",
            DisplayPattern::MomYoy => "mom_yoy",
            DisplayPattern::ManualCalc => "manual_calc",
            DisplayPattern::WebScrape => "web_scrape",
            DisplayPattern::Calculated => "calculated",
            DisplayPattern::Api => "api",
        }
    }
}

/// Scaling rule applied right after fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Unit after rescaling, for display (e.g. "USD bn", "%").
    pub label: String,
    /// Multiplicative factor applied to every fetched value.
    #[serde(default = "default_factor")]
    pub factor: f64,
}

fn default_factor() -> f64 {
    1.0
}

impl Unit {
    pub fn new(label: impl Into<String>, factor: f64) -> Self {
        Self {
            label: label.into(),
            factor,
        }
    }

    /// Values already in the display unit.
    pub fn identity(label: impl Into<String>) -> Self {
        Self::new(label, 1.0)
    }

    /// Millions → billions (`× 0.001`).
    pub fn millions_to_billions(label: impl Into<String>) -> Self {
        Self::new(label, 0.001)
    }
}

/// Rule for a derived column. Inputs are indicator names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Derivation {
    /// `minuend − Σ subtrahends` (net liquidity, real yield).
    Difference {
        minuend: String,
        subtrahends: Vec<String>,
    },
    /// `numerator ÷ denominator × scale` (bills ratio).
    Ratio {
        numerator: String,
        denominator: String,
        scale: f64,
    },
    /// `nominal ÷ ffill(price_index) × base` (real money supply).
    RealIndex {
        nominal: String,
        price_index: String,
        base: f64,
    },
}

impl Derivation {
    /// Names of all input columns this rule needs.
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            Derivation::Difference {
                minuend,
                subtrahends,
            } => std::iter::once(minuend.as_str())
                .chain(subtrahends.iter().map(String::as_str))
                .collect(),
            Derivation::Ratio {
                numerator,
                denominator,
                ..
            } => vec![numerator.as_str(), denominator.as_str()],
            Derivation::RealIndex {
                nominal,
                price_index,
                ..
            } => vec![nominal.as_str(), price_index.as_str()],
        }
    }
}

/// One tracked indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorDef {
    pub name: String,
    pub label: String,
    pub source: Source,
    /// Candidate upstream ids, tried in order until one returns data.
    #[serde(default)]
    pub source_ids: Vec<String>,
    pub unit: Unit,
    pub frequency: Frequency,
    pub category: Category,
    pub display_pattern: DisplayPattern,
    #[serde(default)]
    pub derivation: Option<Derivation>,
}

impl IndicatorDef {
    /// The preferred upstream id (first candidate).
    pub fn primary_source_id(&self) -> Option<&str> {
        self.source_ids.first().map(String::as_str)
    }

    pub fn is_derived(&self) -> bool {
        self.source == Source::Derived
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: &str| RegistryError::Invalid {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("empty name"));
        }
        if !(self.unit.factor.is_finite() && self.unit.factor != 0.0) {
            return Err(invalid("unit factor must be finite and non-zero"));
        }
        match (self.source, &self.derivation) {
            (Source::Derived, None) => Err(invalid("derived indicator without a derivation")),
            (Source::Derived, Some(_)) => Ok(()),
            (_, Some(_)) => Err(invalid("only derived indicators may carry a derivation")),
            (_, None) if self.source_ids.is_empty() => Err(invalid("no source ids")),
            (_, None) => Ok(()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    indicators: Vec<IndicatorDef>,
}

/// Read-only, validated indicator catalog.
#[derive(Debug, Clone)]
pub struct Registry {
    defs: Vec<IndicatorDef>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Build a registry, validating names, source ids and derivation inputs.
    ///
    /// Derivation inputs must name indicators defined earlier in the list:
    /// registry order is the evaluation order of derived columns.
    pub fn new(defs: Vec<IndicatorDef>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(defs.len());
        for (i, def) in defs.iter().enumerate() {
            def.validate()?;
            if let Some(rule) = &def.derivation {
                for input in rule.inputs() {
                    if !index.contains_key(input) {
                        return Err(RegistryError::Invalid {
                            name: def.name.clone(),
                            reason: format!("input '{input}' is not defined before it"),
                        });
                    }
                }
            }
            if index.insert(def.name.clone(), i).is_some() {
                return Err(RegistryError::DuplicateName(def.name.clone()));
            }
        }
        Ok(Self { defs, index })
    }

    /// Load a registry from a TOML file (`[[indicators]]` tables).
    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::Parse(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse a registry from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile =
            toml::from_str(content).map_err(|e| RegistryError::Parse(e.to_string()))?;
        Self::new(file.indicators)
    }

    /// Serialize the registry to TOML.
    pub fn to_toml(&self) -> Result<String, RegistryError> {
        let file = RegistryFile {
            indicators: self.defs.clone(),
        };
        toml::to_string_pretty(&file).map_err(|e| RegistryError::Parse(e.to_string()))
    }

    pub fn lookup(&self, name: &str) -> Result<&IndicatorDef, RegistryError> {
        self.index
            .get(name)
            .map(|&i| &self.defs[i])
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All indicators matching `predicate`, in registry order.
    pub fn list_by<F>(&self, predicate: F) -> Vec<&IndicatorDef>
    where
        F: Fn(&IndicatorDef) -> bool,
    {
        self.defs.iter().filter(|d| predicate(d)).collect()
    }

    pub fn by_category(&self, category: Category) -> Vec<&IndicatorDef> {
        self.list_by(|d| d.category == category)
    }

    pub fn by_source(&self, source: Source) -> Vec<&IndicatorDef> {
        self.list_by(|d| d.source == source)
    }

    /// Derived indicators with their rules, in evaluation order.
    pub fn derivations(&self) -> Vec<(&str, &Derivation)> {
        self.defs
            .iter()
            .filter_map(|d| d.derivation.as_ref().map(|r| (d.name.as_str(), r)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndicatorDef> {
        self.defs.iter()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}
