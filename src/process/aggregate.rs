// src/process/aggregate.rs

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::IndicatorEntry;
use crate::panel::{CellKey, IndicatorPanel};

/// Sum `children` into `parent`. Codes are in the provider scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationRule {
    pub parent: String,
    pub children: Vec<String>,
}

impl AggregationRule {
    pub fn new(parent: impl Into<String>, children: &[&str]) -> Self {
        Self {
            parent: parent.into(),
            children: children.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Kosovo is reported separately by the provider and merged into Serbia.
pub fn default_rules() -> Vec<AggregationRule> {
    vec![AggregationRule::new("RS", &["XK"])]
}

/// Merge dependent regions into their parents for `entry.code`.
///
/// For every year the indicator has any cell, the parent becomes the sum of
/// the reported values among parent and children. When none of them
/// reported a value the parent is left as it was, so all-absent stays
/// absent. Children are kept. Rules run in order, each seeing the output of
/// the previous one.
///
/// Indicators not flagged for aggregation pass through unchanged.
#[tracing::instrument(level = "debug", skip_all, fields(indicator = entry.code))]
pub fn aggregate(
    panel: &IndicatorPanel,
    entry: &IndicatorEntry,
    rules: &[AggregationRule],
) -> IndicatorPanel {
    let code = entry.code;
    if !entry.aggregate {
        for rule in rules {
            let has_data = panel.iter().any(|(k, v)| {
                k.indicator == code && v.is_some() && rule.children.contains(&k.region)
            });
            if has_data {
                warn!(
                    indicator = code,
                    parent = %rule.parent,
                    children = ?rule.children,
                    "disputed region left unmerged because the indicator is not summable; \
                     its values may carry materially different data quality than the merged alternative"
                );
            }
        }
        return panel.clone();
    }

    let years = panel.years_of(code);
    let mut out = panel.clone();
    for rule in rules {
        let mut merged = 0usize;
        for &year in &years {
            let contributors = std::iter::once(&rule.parent).chain(rule.children.iter());
            let present: Vec<f64> = contributors
                .filter_map(|region| out.get(region, year, code))
                .collect();
            if present.is_empty() {
                continue;
            }
            let total = present.iter().sum::<f64>();
            out.insert(CellKey::new(rule.parent.as_str(), year, code), Some(total));
            merged += 1;
        }
        debug!(parent = %rule.parent, years = merged, "applied aggregation rule");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IndicatorCatalog;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    fn pop() -> &'static IndicatorEntry {
        IndicatorCatalog::wdi().get("SP.POP.TOTL").unwrap()
    }

    fn share() -> &'static IndicatorEntry {
        IndicatorCatalog::wdi().get("SP.URB.TOTL.IN.ZS").unwrap()
    }

    #[test]
    fn sums_children_into_parent_and_keeps_children() {
        let panel = IndicatorPanel::from_rows(vec![
            ("RS", 2020, "SP.POP.TOTL", Some(6.8)),
            ("XK", 2020, "SP.POP.TOTL", Some(0.1)),
        ]);
        let out = aggregate(&panel, pop(), &default_rules());
        let rs = out.get("RS", 2020, "SP.POP.TOTL").unwrap();
        assert!((rs - 6.9).abs() < 1e-12);
        assert_eq!(out.get("XK", 2020, "SP.POP.TOTL"), Some(0.1));
    }

    #[test]
    fn absent_contributors_are_skipped() {
        let panel = IndicatorPanel::from_rows(vec![
            ("RS", 2019, "SP.POP.TOTL", None),
            ("XK", 2019, "SP.POP.TOTL", Some(0.1)),
            ("RS", 2020, "SP.POP.TOTL", Some(6.8)),
        ]);
        let out = aggregate(&panel, pop(), &default_rules());
        assert_eq!(out.get("RS", 2019, "SP.POP.TOTL"), Some(0.1));
        assert_eq!(out.get("RS", 2020, "SP.POP.TOTL"), Some(6.8));
    }

    #[test]
    fn all_absent_stays_absent() {
        let panel = IndicatorPanel::from_rows(vec![
            ("RS", 2019, "SP.POP.TOTL", None),
            ("XK", 2019, "SP.POP.TOTL", None),
            ("DE", 2020, "SP.POP.TOTL", Some(83.0)),
        ]);
        let out = aggregate(&panel, pop(), &default_rules());
        assert!(out.contains("RS", 2019, "SP.POP.TOTL"));
        assert_eq!(out.get("RS", 2019, "SP.POP.TOTL"), None);
        // no parent cell is invented for a year nobody reported
        assert!(!out.contains("RS", 2020, "SP.POP.TOTL"));
    }

    #[test]
    fn parent_created_when_only_children_report() {
        let panel = IndicatorPanel::from_rows(vec![("XK", 2020, "SP.POP.TOTL", Some(0.1))]);
        let out = aggregate(&panel, pop(), &default_rules());
        assert_eq!(out.get("RS", 2020, "SP.POP.TOTL"), Some(0.1));
    }

    #[test]
    fn ineligible_indicator_is_identity() {
        let panel = IndicatorPanel::from_rows(vec![
            ("RS", 2020, "SP.URB.TOTL.IN.ZS", Some(56.4)),
            ("XK", 2020, "SP.URB.TOTL.IN.ZS", Some(38.0)),
        ]);
        assert_eq!(aggregate(&panel, share(), &default_rules()), panel);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logs_of(panel: &IndicatorPanel) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            aggregate(panel, share(), &default_rules());
        });
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn unmerged_child_with_data_warns_about_data_quality() {
        let logs = logs_of(&IndicatorPanel::from_rows(vec![
            ("RS", 2020, "SP.URB.TOTL.IN.ZS", Some(56.4)),
            ("XK", 2020, "SP.URB.TOTL.IN.ZS", Some(38.0)),
        ]));
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("disputed region left unmerged"), "{logs}");
        assert!(logs.contains("materially different data quality"), "{logs}");
        assert!(logs.contains("parent=RS"), "{logs}");
    }

    #[test]
    fn unmerged_child_without_data_stays_silent() {
        let logs = logs_of(&IndicatorPanel::from_rows(vec![
            ("RS", 2020, "SP.URB.TOTL.IN.ZS", Some(56.4)),
            ("XK", 2020, "SP.URB.TOTL.IN.ZS", None),
        ]));
        assert!(logs.is_empty(), "{logs}");
    }

    #[test]
    fn several_children_and_rules() {
        let rules = vec![
            AggregationRule::new("AA", &["BB", "CC"]),
            AggregationRule::new("DD", &["EE"]),
        ];
        let panel = IndicatorPanel::from_rows(vec![
            ("AA", 2000, "SP.POP.TOTL", Some(1.0)),
            ("BB", 2000, "SP.POP.TOTL", Some(2.0)),
            ("CC", 2000, "SP.POP.TOTL", None),
            ("EE", 2000, "SP.POP.TOTL", Some(4.0)),
        ]);
        let out = aggregate(&panel, pop(), &rules);
        assert_eq!(out.get("AA", 2000, "SP.POP.TOTL"), Some(3.0));
        assert_eq!(out.get("DD", 2000, "SP.POP.TOTL"), Some(4.0));
    }

    #[test]
    fn other_indicators_are_untouched() {
        let panel = IndicatorPanel::from_rows(vec![
            ("RS", 2020, "SP.POP.TOTL", Some(6.8)),
            ("XK", 2020, "SP.POP.TOTL", Some(0.1)),
            ("XK", 2020, "NY.GDP.MKTP.CD", Some(9.0)),
        ]);
        let out = aggregate(&panel, pop(), &default_rules());
        assert!(!out.contains("RS", 2020, "NY.GDP.MKTP.CD"));
    }
}
