//! The built-in indicator catalog.
//!
//! This is the current, authoritative upstream mapping. Where an upstream id
//! has been unstable, later candidates in `source_ids` are tried in order.

use super::{Category, Derivation, DisplayPattern, Frequency, IndicatorDef, Registry, Source, Unit};

#[allow(clippy::too_many_arguments)]
fn def(
    name: &str,
    label: &str,
    source: Source,
    ids: &[&str],
    unit: Unit,
    frequency: Frequency,
    category: Category,
    display_pattern: DisplayPattern,
) -> IndicatorDef {
    IndicatorDef {
        name: name.to_string(),
        label: label.to_string(),
        source,
        source_ids: ids.iter().map(|s| s.to_string()).collect(),
        unit,
        frequency,
        category,
        display_pattern,
        derivation: None,
    }
}

fn derived(
    name: &str,
    label: &str,
    unit: Unit,
    frequency: Frequency,
    category: Category,
    rule: Derivation,
) -> IndicatorDef {
    IndicatorDef {
        name: name.to_string(),
        label: label.to_string(),
        source: Source::Derived,
        source_ids: Vec::new(),
        unit,
        frequency,
        category,
        display_pattern: DisplayPattern::Calculated,
        derivation: Some(rule),
    }
}

fn real_money(name: &str, label: &str, nominal: &str, price_index: &str) -> IndicatorDef {
    derived(
        name,
        label,
        Unit::identity("bn, base-100 prices"),
        Frequency::Monthly,
        Category::Money,
        Derivation::RealIndex {
            nominal: nominal.to_string(),
            price_index: price_index.to_string(),
            base: 100.0,
        },
    )
}

/// All built-in indicator definitions, in evaluation order.
pub fn builtin_defs() -> Vec<IndicatorDef> {
    use Category::*;
    use DisplayPattern::*;
    use Frequency::*;

    let pct = || Unit::identity("%");
    let usd_bn = || Unit::millions_to_billions("USD bn");

    vec![
        // ── Liquidity ────────────────────────────────────────────────
        def("fed_total_assets", "Fed Total Assets", Source::Fred, &["WALCL"], usd_bn(), Weekly, Liquidity, Standard),
        def("tga", "Treasury General Account", Source::Fred, &["WTREGEN"], usd_bn(), Weekly, Liquidity, Standard),
        def("reverse_repo", "Overnight Reverse Repo", Source::Fred, &["RRPONTSYD"], Unit::identity("USD bn"), Daily, Liquidity, Standard),
        def("bank_reserves", "Reserve Balances", Source::Fred, &["WRESBAL"], usd_bn(), Weekly, Liquidity, Standard),
        def("soma_treasuries", "SOMA Treasury Holdings", Source::Fred, &["TREAST"], usd_bn(), Weekly, Liquidity, Standard),
        def("soma_bills", "SOMA Bills Holdings", Source::Fred, &["WSHOBL", "TREASBILLS"], usd_bn(), Weekly, Liquidity, Standard),
        def("h41_treasury_securities", "H.4.1 Treasury Securities", Source::WebScrape, &["u.s. treasury securities", "treasury securities!total"], usd_bn(), Weekly, Liquidity, WebScrape),
        def("h41_loans", "H.4.1 Loans", Source::WebScrape, &["loans!total"], usd_bn(), Weekly, Liquidity, WebScrape),
        derived(
            "net_liquidity",
            "Net Liquidity",
            Unit::identity("USD bn"),
            Weekly,
            Liquidity,
            Derivation::Difference {
                minuend: "fed_total_assets".into(),
                subtrahends: vec!["tga".into(), "reverse_repo".into()],
            },
        ),
        derived(
            "soma_bills_ratio",
            "SOMA Bills Ratio",
            pct(),
            Weekly,
            Liquidity,
            Derivation::Ratio {
                numerator: "soma_bills".into(),
                denominator: "soma_treasuries".into(),
                scale: 100.0,
            },
        ),
        // ── Rates ────────────────────────────────────────────────────
        def("us10y", "10Y Treasury Yield", Source::Fred, &["DGS10"], pct(), Daily, Rates, Standard),
        def("breakeven_10y", "10Y Breakeven Inflation", Source::Fred, &["T10YIE"], pct(), Daily, Rates, Standard),
        def("fed_funds", "Effective Fed Funds", Source::Fred, &["EFFR", "DFF"], pct(), Daily, Rates, Standard),
        def("sofr", "SOFR", Source::Fred, &["SOFR"], pct(), Daily, Rates, Standard),
        def("hy_spread", "High Yield OAS", Source::Fred, &["BAMLH0A0HYM2"], pct(), Daily, Rates, Standard),
        derived(
            "real_yield_10y",
            "10Y Real Yield",
            pct(),
            Daily,
            Rates,
            Derivation::Difference {
                minuend: "us10y".into(),
                subtrahends: vec!["breakeven_10y".into()],
            },
        ),
        // ── Inflation ────────────────────────────────────────────────
        def("cpi_us", "US CPI", Source::Fred, &["CPIAUCSL"], Unit::identity("index"), Monthly, Inflation, MomYoy),
        def("core_pce", "Core PCE", Source::Fred, &["PCEPILFE"], Unit::identity("index"), Monthly, Inflation, MomYoy),
        def("cpi_eu", "Euro Area HICP", Source::Fred, &["CP0000EZ19M086NEST"], Unit::identity("index"), Monthly, Inflation, MomYoy),
        def("cpi_jp", "Japan CPI", Source::Fred, &["JPNCPIALLMINMEI"], Unit::identity("index"), Monthly, Inflation, MomYoy),
        // ── Money ────────────────────────────────────────────────────
        def("m2_us", "US M2", Source::Fred, &["M2SL"], Unit::identity("USD bn"), Monthly, Money, MomYoy),
        def("m2_eu", "Euro Area M2", Source::Fred, &["MABMM301EZM189S"], Unit::new("EUR bn", 1e-9), Monthly, Money, MomYoy),
        def("m2_jp", "Japan M2", Source::Fred, &["MABMM301JPM189S"], Unit::new("JPY bn", 1e-9), Monthly, Money, MomYoy),
        real_money("real_m2_us", "US Real M2", "m2_us", "cpi_us"),
        real_money("real_m2_eu", "Euro Area Real M2", "m2_eu", "cpi_eu"),
        real_money("real_m2_jp", "Japan Real M2", "m2_jp", "cpi_jp"),
        // ── Labor / growth ───────────────────────────────────────────
        def("unemployment_rate", "Unemployment Rate", Source::Fred, &["UNRATE"], pct(), Monthly, Labor, Standard),
        def("nonfarm_payrolls", "Nonfarm Payrolls", Source::Fred, &["PAYEMS"], Unit::identity("thousands"), Monthly, Labor, MomYoy),
        def("real_gdp", "Real GDP", Source::Fred, &["GDPC1"], Unit::identity("USD bn (2017)"), Quarterly, Growth, MomYoy),
        // ── Markets ──────────────────────────────────────────────────
        def("sp500", "S&P 500", Source::Yahoo, &["^GSPC"], Unit::identity("pts"), Daily, Markets, Standard),
        def("nasdaq", "Nasdaq Composite", Source::Yahoo, &["^IXIC"], Unit::identity("pts"), Daily, Markets, Standard),
        def("vix", "VIX", Source::Yahoo, &["^VIX"], Unit::identity("pts"), Daily, Markets, Standard),
        def("dollar_index", "US Dollar Index", Source::Yahoo, &["DX-Y.NYB"], Unit::identity("pts"), Daily, Markets, Standard),
        def("gold", "Gold Futures", Source::Yahoo, &["GC=F"], Unit::identity("USD/oz"), Daily, Markets, Standard),
        def("wti", "WTI Crude", Source::Yahoo, &["CL=F"], Unit::identity("USD/bbl"), Daily, Markets, Standard),
        def("bitcoin", "Bitcoin", Source::Yahoo, &["BTC-USD"], Unit::identity("USD"), Daily, Crypto, Standard),
        // ── Crypto derivatives / stablecoins (live) ──────────────────
        def(
            "btc_funding_rate",
            "BTC Perp Funding Rate",
            Source::Api,
            &["https://fapi.binance.com/fapi/v1/premiumIndex?symbol=BTCUSDT#/lastFundingRate@/time"],
            Unit::new("%", 100.0),
            Daily,
            Crypto,
            Api,
        ),
        def(
            "btc_open_interest",
            "BTC Perp Open Interest",
            Source::Api,
            &["https://fapi.binance.com/fapi/v1/openInterest?symbol=BTCUSDT#/openInterest@/time"],
            Unit::identity("BTC"),
            Daily,
            Crypto,
            Api,
        ),
        def(
            "stablecoin_supply",
            "Stablecoin Supply",
            Source::Api,
            &["https://stablecoins.llama.fi/stablecoincharts/all#/-/totalCirculatingUSD/peggedUSD@/-/date"],
            Unit::new("USD bn", 1e-9),
            Daily,
            Crypto,
            Api,
        ),
    ]
}

impl Registry {
    /// The built-in catalog.
    pub fn builtin() -> Self {
        Registry::new(builtin_defs()).expect("built-in registry is valid")
    }
}
