// src/process/filter.rs

use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use crate::panel::{CellKey, IndicatorPanel};
use crate::regions::HarmonizedRow;

/// Result of dropping unresolved regions.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub panel: IndicatorPanel,
    /// Provider codes whose rows were removed, sorted.
    pub dropped_regions: Vec<String>,
}

/// Keep only rows with a non-empty canonical region code.
///
/// If two provider codes resolve to the same canonical code, the smaller
/// provider code keeps the cells and the other one is dropped with a warning.
#[tracing::instrument(level = "debug", skip_all, fields(rows = rows.len()))]
pub fn filter_valid(rows: Vec<HarmonizedRow>) -> FilterOutcome {
    let mut rows = rows;
    rows.sort_by(|a, b| a.source_region.cmp(&b.source_region));

    let mut owner: BTreeMap<String, String> = BTreeMap::new();
    let mut dropped: BTreeSet<String> = BTreeSet::new();
    let mut panel = IndicatorPanel::new();

    for row in rows {
        let region = match row.region.as_deref().map(str::trim) {
            Some(r) if !r.is_empty() => r.to_string(),
            _ => {
                dropped.insert(row.source_region);
                continue;
            }
        };

        let first = owner
            .entry(region.clone())
            .or_insert_with(|| row.source_region.clone());
        if *first != row.source_region {
            if dropped.insert(row.source_region.clone()) {
                warn!(
                    canonical = %region,
                    kept = %first,
                    dropped = %row.source_region,
                    "two provider codes map to one region; keeping the first"
                );
            }
            continue;
        }

        panel.insert(CellKey::new(region, row.year, row.indicator), row.value);
    }

    if !dropped.is_empty() {
        info!(
            dropped_region_count = dropped.len(),
            dropped = ?dropped,
            "removed unresolvable regions"
        );
    }
    FilterOutcome {
        panel,
        dropped_regions: dropped.into_iter().collect(),
    }
}
