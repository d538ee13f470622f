// src/process/scale.rs

use crate::panel::IndicatorPanel;

/// Multiply every reported value by `factor`; gaps are left as gaps.
#[tracing::instrument(level = "debug", skip(panel), fields(cells = panel.len()))]
pub fn scale(panel: &IndicatorPanel, factor: f64) -> IndicatorPanel {
    if factor == 1.0 {
        return panel.clone();
    }
    panel.map_values(|_, v| v * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> IndicatorPanel {
        IndicatorPanel::from_rows(vec![
            ("RS", 2020, "SP.POP.TOTL", Some(6_800_000.0)),
            ("XK", 2020, "SP.POP.TOTL", Some(100_000.0)),
            ("XK", 2021, "SP.POP.TOTL", None),
        ])
    }

    #[test]
    fn unit_factor_is_identity() {
        assert_eq!(scale(&raw(), 1.0), raw());
    }

    #[test]
    fn scaling_composes_multiplicatively() {
        // powers of two keep the products exact
        let twice = scale(&scale(&raw(), 0.5), 4.0);
        let once = scale(&raw(), 2.0);
        assert_eq!(twice, once);
    }

    #[test]
    fn gaps_are_not_materialised_as_zero() {
        let out = scale(&raw(), 1e-6);
        assert!(out.contains("XK", 2021, "SP.POP.TOTL"));
        assert_eq!(out.get("XK", 2021, "SP.POP.TOTL"), None);
        let rs = out.get("RS", 2020, "SP.POP.TOTL").unwrap();
        assert!((rs - 6.8).abs() < 1e-12);
    }
}
