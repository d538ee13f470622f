// src/process/rebase.rs

use tracing::info;

use crate::catalog::IndicatorEntry;
use crate::error::RebasingError;
use crate::panel::IndicatorPanel;
use crate::rebase::BasisRebaser;

/// Basis the provider publishes PPP GDP in.
pub const SOURCE_BASIS: &str = "constant 2021 Int$PPP";
/// Basis the modeling framework works in.
pub const TARGET_BASIS: &str = "constant 2017 Int$PPP";
/// Factor source handed to the rebasing service.
pub const FACTOR_SOURCE: &str = "wb_wdi";

/// Rebase `panel` when the catalog flags the indicator, otherwise return it
/// unchanged. The panel must already carry canonical region codes.
pub fn rebase_if_flagged(
    panel: &IndicatorPanel,
    entry: &IndicatorEntry,
    rebaser: &dyn BasisRebaser,
) -> Result<IndicatorPanel, RebasingError> {
    if !entry.rebase {
        return Ok(panel.clone());
    }
    info!(
        indicator = entry.code,
        from = SOURCE_BASIS,
        to = TARGET_BASIS,
        "rebasing monetary series"
    );
    rebaser.rebase(panel, SOURCE_BASIS, TARGET_BASIS, FACTOR_SOURCE)
}
