// src/regions/harmonize.rs

use std::collections::BTreeMap;
use tracing::debug;

use super::RegionCodeMap;
use crate::panel::IndicatorPanel;

/// One cell after relabelling. `region` is `None` when the provider code
/// could not be mapped to the canonical scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonizedRow {
    pub source_region: String,
    pub region: Option<String>,
    pub year: i32,
    pub indicator: String,
    pub value: Option<f64>,
}

/// Relabel every cell of `panel` from provider codes to canonical codes.
///
/// Every region present in the panel is looked up; unresolved codes are
/// carried as `None` for the validity filter to drop.
#[tracing::instrument(level = "debug", skip_all, fields(cells = panel.len()))]
pub fn harmonize(panel: &IndicatorPanel, map: &RegionCodeMap) -> Vec<HarmonizedRow> {
    let resolved: BTreeMap<&str, Option<String>> = panel
        .regions()
        .into_iter()
        .map(|code| (code, map.lookup(code)))
        .collect();

    let unresolved = resolved.values().filter(|v| v.is_none()).count();
    debug!(regions = resolved.len(), unresolved, "resolved region codes");

    panel
        .iter()
        .map(|(key, value)| HarmonizedRow {
            source_region: key.region.clone(),
            region: resolved.get(key.region.as_str()).cloned().flatten(),
            year: key.year,
            indicator: key.indicator.clone(),
            value: *value,
        })
        .collect()
}
