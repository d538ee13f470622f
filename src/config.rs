// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path, path::PathBuf};

use crate::cache::CacheKey;
use crate::error::ConfigurationError;
use crate::process::{default_rules, AggregationRule};
use crate::regions::default_overrides;

/// Process-wide settings, read once before any conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub cache_dir: PathBuf,
    /// Active raw-data version, `name@version`.
    pub cache_key: String,
    pub start_year: i32,
    pub end_year: i32,
    pub region_overrides: BTreeMap<String, String>,
    pub aggregation_rules: Vec<AggregationRule>,
    /// CSV with `iso3c,year,ppp,mer,deflator`.
    pub factors_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            cache_key: "wdi@latest-manual".to_string(),
            start_year: 1960,
            end_year: 2023,
            region_overrides: default_overrides(),
            aggregation_rules: default_rules(),
            factors_path: None,
        }
    }
}

impl Settings {
    /// Load from a YAML file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let settings = Self::from_yaml(&text)
            .with_context(|| format!("parsing settings {}", path.display()))?;
        Ok(settings)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults, or the file at `path` when given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn cache_key(&self) -> Result<CacheKey> {
        self.cache_key.parse()
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        if self.start_year > self.end_year {
            return Err(ConfigurationError::Setting(format!(
                "start_year {} is after end_year {}",
                self.start_year, self.end_year
            )));
        }
        for rule in &self.aggregation_rules {
            if rule.children.is_empty() {
                return Err(ConfigurationError::Setting(format!(
                    "aggregation rule for {} has no children",
                    rule.parent
                )));
            }
            if rule.children.contains(&rule.parent) {
                return Err(ConfigurationError::Setting(format!(
                    "aggregation rule for {} lists itself as a child",
                    rule.parent
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let s = Settings::from_yaml("{}").unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.aggregation_rules, vec![AggregationRule::new("RS", &["XK"])]);
        assert_eq!(s.region_overrides.get("JG").map(String::as_str), Some("JEY"));
    }

    #[test]
    fn reads_rules_and_overrides() {
        let yaml = r#"
cache_key: wdi@2024-09-19
start_year: 1990
region_overrides:
  JG: JEY
  XK: KOS
aggregation_rules:
  - parent: RS
    children: [XK]
  - parent: CY
    children: [XC]
factors_path: data/factors.csv
"#;
        let s = Settings::from_yaml(yaml).unwrap();
        assert_eq!(s.start_year, 1990);
        assert_eq!(s.end_year, 2023);
        assert_eq!(s.aggregation_rules.len(), 2);
        assert_eq!(s.region_overrides["XK"], "KOS");
        assert_eq!(s.cache_key().unwrap().version, "2024-09-19");
        assert_eq!(s.factors_path, Some(PathBuf::from("data/factors.csv")));
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(Settings::from_yaml("start_year: 2030\nend_year: 2000").is_err());
        assert!(
            Settings::from_yaml("aggregation_rules:\n  - parent: RS\n    children: []").is_err()
        );
        assert!(Settings::from_yaml("cache_dirr: x").is_err());
    }
}
