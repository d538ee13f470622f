// src/process/mod.rs
pub mod aggregate;
pub mod filter;
pub mod rebase;
pub mod scale;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::catalog::{IndicatorCatalog, IndicatorMetadata};
use crate::error::Result;
use crate::panel::IndicatorPanel;
use crate::rebase::BasisRebaser;
use crate::regions::{harmonize, RegionCodeMap};

pub use aggregate::{aggregate, default_rules, AggregationRule};
pub use filter::{filter_valid, FilterOutcome};
pub use rebase::{rebase_if_flagged, FACTOR_SOURCE, SOURCE_BASIS, TARGET_BASIS};
pub use scale::scale;

/// A cleaned single-indicator panel and its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub panel: IndicatorPanel,
    pub metadata: IndicatorMetadata,
    /// Provider codes removed because they had no canonical counterpart.
    pub dropped_regions: Vec<String>,
}

/// Runs the conversion pipeline over shared read-only configuration.
#[derive(Clone, Copy)]
pub struct Converter<'a> {
    catalog: &'a IndicatorCatalog,
    regions: &'a RegionCodeMap,
    rules: &'a [AggregationRule],
    rebaser: &'a dyn BasisRebaser,
}

impl<'a> Converter<'a> {
    pub fn new(
        catalog: &'a IndicatorCatalog,
        regions: &'a RegionCodeMap,
        rules: &'a [AggregationRule],
        rebaser: &'a dyn BasisRebaser,
    ) -> Self {
        Self {
            catalog,
            regions,
            rules,
            rebaser,
        }
    }

    /// Convert one indicator of `raw` (provider region codes) into a clean
    /// panel with canonical codes and working units.
    ///
    /// Order: resolve alias, check membership, slice, scale, aggregate
    /// (provider codes), harmonize, filter, rebase. Any error aborts the
    /// whole conversion.
    #[tracing::instrument(level = "info", skip(self, raw), fields(cells = raw.len()))]
    pub fn convert(&self, raw: &IndicatorPanel, tag: &str) -> Result<Conversion> {
        let code = self.catalog.resolve_alias(tag);
        let entry = self.catalog.check_membership(&code, raw.indicators())?;
        debug!(
            code = entry.code,
            scale = entry.scale,
            aggregate = entry.aggregate,
            rebase = entry.rebase,
            "resolved indicator"
        );

        let sliced = raw.slice(entry.code);
        let scaled = scale(&sliced, entry.scale);
        let merged = aggregate(&scaled, entry, self.rules);
        let relabelled = harmonize(&merged, self.regions);
        let FilterOutcome {
            panel: valid,
            dropped_regions,
        } = filter_valid(relabelled);
        let panel = rebase_if_flagged(&valid, entry, self.rebaser)?;

        info!(
            code = entry.code,
            regions = panel.regions().len(),
            years = panel.years().len(),
            dropped_region_count = dropped_regions.len(),
            "converted indicator"
        );
        Ok(Conversion {
            panel,
            metadata: IndicatorMetadata::from(entry),
            dropped_regions,
        })
    }

    /// Convert several indicators in parallel. Results keep the order of `tags`.
    pub fn convert_many<S>(&self, raw: &IndicatorPanel, tags: &[S]) -> Vec<Result<Conversion>>
    where
        S: AsRef<str> + Sync,
    {
        tags.par_iter()
            .map(|tag| self.convert(raw, tag.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigurationError, ConvertError, RebasingError};
    use crate::panel::to_parquet_bytes;
    use crate::rebase::{Factors, FactorTable};

    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .with_test_writer()
            .try_init();
    }

    fn raw() -> IndicatorPanel {
        IndicatorPanel::from_rows(vec![
            ("XK", 2020, "SP.POP.TOTL", Some(100_000.0)),
            ("RS", 2020, "SP.POP.TOTL", Some(6_800_000.0)),
            ("XK", 2020, "NY.GDP.MKTP.PP.KD", Some(2.0e10)),
            ("RS", 2020, "NY.GDP.MKTP.PP.KD", Some(1.4e11)),
            ("1W", 2020, "NY.GDP.MKTP.PP.KD", Some(1.3e14)),
            ("RS", 2020, "SP.URB.TOTL.IN.ZS", Some(56.4)),
            ("XK", 2020, "SP.URB.TOTL.IN.ZS", Some(38.0)),
        ])
    }

    fn factors() -> FactorTable {
        let mut t = FactorTable::new();
        t.insert("SRB", 2017, Factors { ppp: Some(40.0), mer: None, deflator: Some(100.0) });
        t.insert("SRB", 2021, Factors { ppp: Some(50.0), mer: None, deflator: Some(125.0) });
        t
    }

    fn with_converter<T>(rebaser: &dyn BasisRebaser, f: impl FnOnce(Converter<'_>) -> T) -> T {
        let regions = RegionCodeMap::default();
        let rules = default_rules();
        f(Converter::new(IndicatorCatalog::wdi(), &regions, &rules, rebaser))
    }

    #[test]
    fn kosovo_population_ends_up_in_serbia() {
        init_logging();
        let out = with_converter(&FactorTable::new(), |c| c.convert(&raw(), "pop")).unwrap();

        assert_eq!(out.panel.len(), 1);
        let srb = out.panel.get("SRB", 2020, "SP.POP.TOTL").unwrap();
        assert!((srb - 6.9).abs() < 1e-9);
        assert_eq!(out.dropped_regions, vec!["XK"]);
        assert_eq!(out.metadata.unit, "million people");
        assert_eq!(out.metadata.license, "CC BY-4.0");
    }

    #[test]
    fn unknown_tag_lists_catalog() {
        let err = with_converter(&FactorTable::new(), |c| c.convert(&raw(), "xyz")).unwrap_err();
        match &err {
            ConvertError::Configuration(ConfigurationError::UnknownIndicator { tag, valid }) => {
                assert_eq!(tag, "xyz");
                assert_eq!(*valid, IndicatorCatalog::wdi().codes());
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("\nSP.POP.TOTL"));
    }

    #[test]
    fn ppp_gdp_is_aggregated_then_rebased() {
        let out = with_converter(&factors(), |c| c.convert(&raw(), "gdp")).unwrap();
        // (1.4e11 + 2e10) * 1e-6 = 160000, then * 50 * 0.8 / 40
        let v = out.panel.get("SRB", 2020, "NY.GDP.MKTP.PP.KD").unwrap();
        assert!((v - 160_000.0).abs() < 1e-6);
        assert!(out.dropped_regions.contains(&"1W".to_string()));
    }

    #[test]
    fn missing_rebasing_factor_aborts_without_output() {
        let err = with_converter(&FactorTable::new(), |c| c.convert(&raw(), "gdp")).unwrap_err();
        match err {
            ConvertError::Rebasing(RebasingError::MissingFactor { region, year, .. }) => {
                assert_eq!(region, "SRB");
                assert_eq!(year, 2020);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn shares_are_not_merged() {
        let out = with_converter(&FactorTable::new(), |c| c.convert(&raw(), "urbanshare")).unwrap();
        assert_eq!(out.panel.get("SRB", 2020, "SP.URB.TOTL.IN.ZS"), Some(56.4));
    }

    #[test]
    fn repeated_runs_are_bit_identical() {
        let a = with_converter(&factors(), |c| c.convert(&raw(), "gdp")).unwrap();
        let b = with_converter(&factors(), |c| c.convert(&raw(), "gdp")).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            to_parquet_bytes(&a.panel).unwrap(),
            to_parquet_bytes(&b.panel).unwrap()
        );
    }

    #[test]
    fn convert_many_keeps_order_and_isolates_failures() {
        let tags = ["pop", "xyz", "urbanshare"];
        let results = with_converter(&FactorTable::new(), |c| c.convert_many(&raw(), &tags));
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().metadata.code, "SP.POP.TOTL");
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().metadata.code, "SP.URB.TOTL.IN.ZS");
    }
}
