// src/catalog.rs

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::ConfigurationError;

const WDI_LICENSE: &str = "CC BY-4.0";

/// Static description of one indicator series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorEntry {
    pub code: &'static str,
    pub alias: Option<&'static str>,
    /// Multiplier from the provider's raw unit to the working unit.
    pub scale: f64,
    /// Whether dependent territories may be summed into their parent.
    pub aggregate: bool,
    /// Whether the series must be moved to another price basis.
    pub rebase: bool,
    pub title: &'static str,
    pub unit: &'static str,
    pub license: &'static str,
}

/// Free-text provenance handed back with a converted panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorMetadata {
    pub code: String,
    pub title: String,
    pub unit: String,
    pub license: String,
}

impl From<&IndicatorEntry> for IndicatorMetadata {
    fn from(e: &IndicatorEntry) -> Self {
        Self {
            code: e.code.to_string(),
            title: e.title.to_string(),
            unit: e.unit.to_string(),
            license: e.license.to_string(),
        }
    }
}

fn entry(
    code: &'static str,
    alias: &'static str,
    scale: f64,
    aggregate: bool,
    rebase: bool,
    title: &'static str,
    unit: &'static str,
) -> IndicatorEntry {
    IndicatorEntry {
        code,
        alias: Some(alias),
        scale,
        aggregate,
        rebase,
        title,
        unit,
        license: WDI_LICENSE,
    }
}

const MILLION: f64 = 1e-6;

#[rustfmt::skip]
fn wdi_entries() -> Vec<IndicatorEntry> {
    vec![
        entry("SP.POP.TOTL", "pop", MILLION, true, false,
            "Population, total", "million people"),
        entry("SP.POP.0014.TO", "pop0014", MILLION, true, false,
            "Population ages 0-14, total", "million people"),
        entry("SP.POP.1564.TO", "pop1564", MILLION, true, false,
            "Population ages 15-64, total", "million people"),
        entry("SP.POP.65UP.TO", "pop65up", MILLION, true, false,
            "Population ages 65 and above, total", "million people"),
        entry("SP.URB.TOTL", "urbanpop", MILLION, true, false,
            "Urban population", "million people"),
        entry("SP.URB.TOTL.IN.ZS", "urbanshare", 1.0, false, false,
            "Urban population (% of total population)", "percent of total population"),
        entry("SL.TLF.TOTL.IN", "labour", MILLION, true, false,
            "Labor force, total", "million people"),
        entry("NY.GDP.MKTP.PP.KD", "gdp", MILLION, true, true,
            "GDP, PPP (constant international $)", "million constant 2017 Int$PPP"),
        entry("NY.GDP.MKTP.PP.CD", "gdp_ppp_current", MILLION, true, false,
            "GDP, PPP (current international $)", "million current Int$PPP"),
        entry("NY.GDP.MKTP.CD", "gdp_mer", MILLION, true, false,
            "GDP (current US$)", "million current US$MER"),
        entry("NY.GDP.MKTP.KD", "gdp_mer_constant", MILLION, true, false,
            "GDP (constant 2015 US$)", "million constant 2015 US$MER"),
        entry("NV.AGR.TOTL.CD", "agvalue", MILLION, true, false,
            "Agriculture, forestry, and fishing, value added (current US$)", "million current US$MER"),
        entry("NY.GDP.PCAP.PP.KD", "gdppc", 1.0, false, false,
            "GDP per capita, PPP (constant international $)", "constant 2021 Int$PPP per person"),
        entry("NY.GDP.DEFL.ZS", "deflator", 1.0, false, false,
            "GDP deflator (base year varies by country)", "index"),
        entry("PA.NUS.PPP", "ppp", 1.0, false, false,
            "PPP conversion factor, GDP (LCU per international $)", "LCU per Int$"),
    ]
}

static WDI: Lazy<IndicatorCatalog> = Lazy::new(|| IndicatorCatalog::new(&wdi_entries()));

/// Read-only set of known indicators, keyed by provider code.
#[derive(Debug, Clone)]
pub struct IndicatorCatalog {
    entries: BTreeMap<&'static str, IndicatorEntry>,
    aliases: BTreeMap<&'static str, &'static str>,
}

impl IndicatorCatalog {
    pub fn new(entries: &[IndicatorEntry]) -> Self {
        let aliases = entries
            .iter()
            .filter_map(|e| e.alias.map(|a| (a, e.code)))
            .collect();
        let entries = entries.iter().map(|e| (e.code, e.clone())).collect();
        Self { entries, aliases }
    }

    /// The built-in World Development Indicators catalog.
    pub fn wdi() -> &'static IndicatorCatalog {
        &WDI
    }

    /// Map a short alias to its provider code; anything else passes through.
    pub fn resolve_alias(&self, tag: &str) -> String {
        match self.aliases.get(tag) {
            Some(code) => code.to_string(),
            None => tag.to_string(),
        }
    }

    pub fn get(&self, code: &str) -> Option<&IndicatorEntry> {
        self.entries.get(code)
    }

    /// All known codes, sorted.
    pub fn codes(&self) -> Vec<String> {
        self.entries.keys().map(|c| c.to_string()).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndicatorEntry> {
        self.entries.values()
    }

    /// Check that `code` is both known and carried by the raw panel.
    pub fn check_membership<'a, I>(
        &self,
        code: &str,
        available: I,
    ) -> Result<&IndicatorEntry, ConfigurationError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let entry = self
            .get(code)
            .ok_or_else(|| ConfigurationError::UnknownIndicator {
                tag: code.to_string(),
                valid: self.codes(),
            })?;

        let mut available: Vec<String> = available.into_iter().map(str::to_string).collect();
        if available.iter().any(|c| c == code) {
            return Ok(entry);
        }
        available.sort();
        available.dedup();
        Err(ConfigurationError::NotInPanel {
            code: code.to_string(),
            available,
        })
    }
}
