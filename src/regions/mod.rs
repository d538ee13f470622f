// src/regions/mod.rs

pub mod crossref;
pub mod harmonize;

use std::{collections::BTreeMap, fmt, sync::Arc};

pub use crossref::{CodeScheme, CountryLookup, CountryTable};
pub use harmonize::{harmonize, HarmonizedRow};

/// Provider codes the general lookup gets wrong or cannot resolve.
pub fn default_overrides() -> BTreeMap<String, String> {
    // the provider files the Channel Islands under JG
    BTreeMap::from([("JG".to_string(), "JEY".to_string())])
}

/// Provider-scheme → canonical-scheme mapping with hand-curated overrides.
#[derive(Clone)]
pub struct RegionCodeMap {
    overrides: BTreeMap<String, String>,
    lookup: Arc<dyn CountryLookup>,
    from: CodeScheme,
    to: CodeScheme,
}

impl fmt::Debug for RegionCodeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionCodeMap")
            .field("overrides", &self.overrides)
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

impl RegionCodeMap {
    /// ISO2 → ISO3 over `lookup`, with `overrides` consulted first.
    pub fn new(lookup: Arc<dyn CountryLookup>, overrides: BTreeMap<String, String>) -> Self {
        Self {
            overrides,
            lookup,
            from: CodeScheme::Iso2,
            to: CodeScheme::Iso3,
        }
    }

    /// Embedded ISO table with the given overrides.
    pub fn iso(overrides: BTreeMap<String, String>) -> Self {
        Self::new(CountryTable::iso3166(), overrides)
    }

    /// Canonical code for `code`, or `None` if neither the overrides nor the
    /// cross-reference know it. Never fails.
    pub fn lookup(&self, code: &str) -> Option<String> {
        if let Some(hit) = self.overrides.get(code) {
            return Some(hit.clone());
        }
        self.lookup.lookup(code, self.from, self.to)
    }

    pub fn overrides(&self) -> &BTreeMap<String, String> {
        &self.overrides
    }
}

impl Default for RegionCodeMap {
    fn default() -> Self {
        Self::iso(default_overrides())
    }
}
