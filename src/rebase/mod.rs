// src/rebase/mod.rs

use anyhow::{anyhow, Result};
use arrow::array::{Array, Float64Array, Int32Array, StringArray};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{collections::HashMap, fmt, path::Path, str::FromStr};
use tracing::{debug, info};

use crate::error::RebasingError;
use crate::panel::{codec::read_typed_csv, IndicatorPanel};

/// Currency convention of a constant-price monetary series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    /// International dollars at purchasing power parity.
    IntPpp,
    /// US dollars at market exchange rates.
    UsMer,
    /// Local currency units.
    Lcu,
}

impl Currency {
    fn label(&self) -> &'static str {
        match self {
            Currency::IntPpp => "Int$PPP",
            Currency::UsMer => "US$MER",
            Currency::Lcu => "LCU",
        }
    }
}

/// A price basis such as `constant 2017 Int$PPP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBasis {
    pub base_year: i32,
    pub currency: Currency,
}

static BASIS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^constant (\d{4}) (Int\$PPP|US\$MER|LCU)$")
        .expect("price basis regex should parse")
});

impl FromStr for PriceBasis {
    type Err = RebasingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let caps = BASIS_RE
            .captures(s.trim())
            .ok_or_else(|| RebasingError::UnknownBasis(s.to_string()))?;
        let base_year = caps[1]
            .parse()
            .map_err(|_| RebasingError::UnknownBasis(s.to_string()))?;
        let currency = match &caps[2] {
            "Int$PPP" => Currency::IntPpp,
            "US$MER" => Currency::UsMer,
            _ => Currency::Lcu,
        };
        Ok(Self {
            base_year,
            currency,
        })
    }
}

impl fmt::Display for PriceBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "constant {} {}", self.base_year, self.currency.label())
    }
}

/// External service moving a monetary panel between price bases.
/// The panel must be keyed by canonical (ISO3) region codes.
pub trait BasisRebaser: Send + Sync {
    fn rebase(
        &self,
        panel: &IndicatorPanel,
        unit_in: &str,
        unit_out: &str,
        source: &str,
    ) -> std::result::Result<IndicatorPanel, RebasingError>;
}

/// Per region and year conversion factors.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Factors {
    /// LCU per international dollar.
    pub ppp: Option<f64>,
    /// LCU per US dollar.
    pub mer: Option<f64>,
    /// GDP deflator, any base.
    pub deflator: Option<f64>,
}

/// [`BasisRebaser`] over a table of PPP, exchange-rate and deflator series.
#[derive(Debug, Clone, Default)]
pub struct FactorTable {
    factors: HashMap<(String, i32), Factors>,
}

impl FactorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, iso3: impl Into<String>, year: i32, factors: Factors) {
        self.factors.insert((iso3.into(), year), factors);
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Load `iso3c,year,ppp,mer,deflator` from CSV. The three factor
    /// columns are each optional; empty cells are missing factors.
    pub fn load(path: &Path) -> Result<Self> {
        let mut table = Self::new();
        for batch in read_typed_csv(path, &["iso3c"], &["year"])? {
            let schema = batch.schema();
            let text = |name: &str| -> Result<StringArray> {
                let idx = schema
                    .index_of(name)
                    .map_err(|_| anyhow!("{} has no `{}` column", path.display(), name))?;
                batch
                    .column(idx)
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .cloned()
                    .ok_or_else(|| anyhow!("`{}` in {} is not text", name, path.display()))
            };
            let num = |name: &str| -> Option<Float64Array> {
                let idx = schema.index_of(name).ok()?;
                batch
                    .column(idx)
                    .as_any()
                    .downcast_ref::<Float64Array>()
                    .cloned()
            };

            let regions = text("iso3c")?;
            let years_idx = schema
                .index_of("year")
                .map_err(|_| anyhow!("{} has no `year` column", path.display()))?;
            let years = batch
                .column(years_idx)
                .as_any()
                .downcast_ref::<Int32Array>()
                .cloned()
                .ok_or_else(|| anyhow!("`year` in {} is not integral", path.display()))?;
            let ppp = num("ppp");
            let mer = num("mer");
            let deflator = num("deflator");

            let cell = |col: &Option<Float64Array>, row: usize| -> Option<f64> {
                col.as_ref()
                    .filter(|a| !a.is_null(row))
                    .map(|a| a.value(row))
            };

            for row in 0..batch.num_rows() {
                if regions.is_null(row) || years.is_null(row) {
                    continue;
                }
                table.insert(
                    regions.value(row),
                    years.value(row),
                    Factors {
                        ppp: cell(&ppp, row),
                        mer: cell(&mer, row),
                        deflator: cell(&deflator, row),
                    },
                );
            }
        }
        info!(path = %path.display(), rows = table.len(), "loaded conversion factors");
        Ok(table)
    }

    fn factor(
        &self,
        region: &str,
        obs_year: i32,
        year: i32,
        name: &'static str,
        pick: fn(&Factors) -> Option<f64>,
        source: &str,
    ) -> std::result::Result<f64, RebasingError> {
        self.factors
            .get(&(region.to_string(), year))
            .and_then(pick)
            .ok_or_else(|| RebasingError::MissingFactor {
                region: region.to_string(),
                year: obs_year,
                factor: name,
                base_year: year,
                source_name: source.to_string(),
            })
    }

    fn currency_factor(
        &self,
        region: &str,
        obs_year: i32,
        basis: PriceBasis,
        source: &str,
    ) -> std::result::Result<f64, RebasingError> {
        match basis.currency {
            Currency::IntPpp => {
                self.factor(region, obs_year, basis.base_year, "PPP", |f| f.ppp, source)
            }
            Currency::UsMer => {
                self.factor(region, obs_year, basis.base_year, "MER", |f| f.mer, source)
            }
            Currency::Lcu => Ok(1.0),
        }
    }

    /// Multiplier taking one unit of `from` to `to` for `region`.
    fn conversion(
        &self,
        region: &str,
        obs_year: i32,
        from: PriceBasis,
        to: PriceBasis,
        source: &str,
    ) -> std::result::Result<f64, RebasingError> {
        let k_in = self.currency_factor(region, obs_year, from, source)?;
        let k_out = self.currency_factor(region, obs_year, to, source)?;
        let deflate = if from.base_year == to.base_year {
            1.0
        } else {
            let deflator = |year| {
                self.factor(region, obs_year, year, "GDP deflator", |f| f.deflator, source)
            };
            let d_in = deflator(from.base_year)?;
            let d_out = deflator(to.base_year)?;
            d_out / d_in
        };
        Ok(k_in * deflate / k_out)
    }
}

impl BasisRebaser for FactorTable {
    #[tracing::instrument(level = "debug", skip(self, panel), fields(cells = panel.len()))]
    fn rebase(
        &self,
        panel: &IndicatorPanel,
        unit_in: &str,
        unit_out: &str,
        source: &str,
    ) -> std::result::Result<IndicatorPanel, RebasingError> {
        let from: PriceBasis = unit_in.parse()?;
        let to: PriceBasis = unit_out.parse()?;
        if from == to {
            return Ok(panel.clone());
        }

        let mut per_region: HashMap<String, f64> = HashMap::new();
        let out = panel.try_map_values(|key, value| {
            if let Some(k) = per_region.get(&key.region) {
                return Ok(value * k);
            }
            let k = self.conversion(&key.region, key.year, from, to, source)?;
            per_region.insert(key.region.clone(), k);
            Ok(value * k)
        })?;
        debug!(%from, %to, regions = per_region.len(), "rebased panel");
        Ok(out)
    }
}
