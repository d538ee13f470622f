// src/panel/mod.rs

pub mod codec;

use std::collections::{BTreeMap, BTreeSet};

pub use codec::{from_parquet_bytes, read_csv, to_parquet_bytes, to_record_batch, write_csv};

/// Address of a single observation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub region: String,
    pub year: i32,
    pub indicator: String,
}

impl CellKey {
    pub fn new(region: impl Into<String>, year: i32, indicator: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            year,
            indicator: indicator.into(),
        }
    }
}

/// Sparse (region, year, indicator) → value table.
///
/// A stored `None` is an explicitly reported gap; a missing key is simply
/// not reported. Neither is ever treated as zero by the panel itself.
/// Iteration is ordered by region, then year, then indicator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorPanel {
    cells: BTreeMap<CellKey, Option<f64>>,
}

impl IndicatorPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from tidy long-format rows. Later rows replace earlier ones
    /// for the same key.
    pub fn from_rows<I, R, N>(rows: I) -> Self
    where
        I: IntoIterator<Item = (R, i32, N, Option<f64>)>,
        R: Into<String>,
        N: Into<String>,
    {
        let cells = rows
            .into_iter()
            .map(|(region, year, indicator, value)| (CellKey::new(region, year, indicator), value))
            .collect();
        Self { cells }
    }

    pub fn insert(&mut self, key: CellKey, value: Option<f64>) -> Option<Option<f64>> {
        self.cells.insert(key, value)
    }

    /// Value at a cell; `None` when the cell is absent or holds an explicit gap.
    pub fn get(&self, region: &str, year: i32, indicator: &str) -> Option<f64> {
        self.cells
            .get(&CellKey::new(region, year, indicator))
            .copied()
            .flatten()
    }

    pub fn contains(&self, region: &str, year: i32, indicator: &str) -> bool {
        self.cells
            .contains_key(&CellKey::new(region, year, indicator))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CellKey, &Option<f64>)> {
        self.cells.iter()
    }

    pub fn regions(&self) -> BTreeSet<&str> {
        self.cells.keys().map(|k| k.region.as_str()).collect()
    }

    pub fn years(&self) -> BTreeSet<i32> {
        self.cells.keys().map(|k| k.year).collect()
    }

    pub fn indicators(&self) -> BTreeSet<&str> {
        self.cells.keys().map(|k| k.indicator.as_str()).collect()
    }

    /// Years carrying any cell for `indicator`.
    pub fn years_of(&self, indicator: &str) -> BTreeSet<i32> {
        self.cells
            .keys()
            .filter(|k| k.indicator == indicator)
            .map(|k| k.year)
            .collect()
    }

    /// New panel restricted to one indicator.
    pub fn slice(&self, indicator: &str) -> Self {
        self.retain(|k, _| k.indicator == indicator)
    }

    /// New panel with cells for which `keep` returns true.
    pub fn retain<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&CellKey, &Option<f64>) -> bool,
    {
        let cells = self
            .cells
            .iter()
            .filter(|(k, v)| keep(k, v))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        Self { cells }
    }

    /// New panel with every present value passed through `f`; gaps stay gaps.
    pub fn map_values<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&CellKey, f64) -> f64,
    {
        let cells = self
            .cells
            .iter()
            .map(|(k, v)| (k.clone(), v.map(|x| f(k, x))))
            .collect();
        Self { cells }
    }

    /// Fallible variant of [`map_values`](Self::map_values).
    pub fn try_map_values<F, E>(&self, mut f: F) -> Result<Self, E>
    where
        F: FnMut(&CellKey, f64) -> Result<f64, E>,
    {
        let mut cells = BTreeMap::new();
        for (k, v) in &self.cells {
            let out = match v {
                Some(x) => Some(f(k, *x)?),
                None => None,
            };
            cells.insert(k.clone(), out);
        }
        Ok(Self { cells })
    }
}

impl FromIterator<(CellKey, Option<f64>)> for IndicatorPanel {
    fn from_iter<T: IntoIterator<Item = (CellKey, Option<f64>)>>(iter: T) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for IndicatorPanel {
    type Item = (CellKey, Option<f64>);
    type IntoIter = std::collections::btree_map::IntoIter<CellKey, Option<f64>>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IndicatorPanel {
        IndicatorPanel::from_rows(vec![
            ("RS", 2020, "SP.POP.TOTL", Some(6_800_000.0)),
            ("XK", 2020, "SP.POP.TOTL", None),
            ("RS", 2020, "NY.GDP.MKTP.CD", Some(5.3e10)),
        ])
    }

    #[test]
    fn explicit_gap_is_kept_but_reads_as_none() {
        let p = sample();
        assert!(p.contains("XK", 2020, "SP.POP.TOTL"));
        assert_eq!(p.get("XK", 2020, "SP.POP.TOTL"), None);
        assert!(!p.contains("XK", 2021, "SP.POP.TOTL"));
    }

    #[test]
    fn slice_keeps_only_one_indicator() {
        let p = sample().slice("SP.POP.TOTL");
        assert_eq!(p.len(), 2);
        assert_eq!(p.indicators().into_iter().collect::<Vec<_>>(), vec!["SP.POP.TOTL"]);
    }

    #[test]
    fn map_values_leaves_gaps_alone() {
        let p = sample().map_values(|_, v| v * 2.0);
        assert_eq!(p.get("RS", 2020, "SP.POP.TOTL"), Some(13_600_000.0));
        assert!(p.contains("XK", 2020, "SP.POP.TOTL"));
        assert_eq!(p.get("XK", 2020, "SP.POP.TOTL"), None);
    }

    #[test]
    fn try_map_values_stops_on_first_error() {
        let res: Result<IndicatorPanel, String> = sample().try_map_values(|k, v| {
            if k.region == "RS" {
                Err(k.indicator.clone())
            } else {
                Ok(v)
            }
        });
        assert_eq!(res.unwrap_err(), "NY.GDP.MKTP.CD");
    }
}
