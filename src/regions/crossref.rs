// src/regions/crossref.rs

use once_cell::sync::Lazy;
use std::{collections::HashMap, sync::Arc};

/// Identifier schemes a region can be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeScheme {
    /// ISO 3166-1 alpha-2, also used by the provider.
    Iso2,
    /// ISO 3166-1 alpha-3, the canonical scheme.
    Iso3,
    /// English short name.
    Name,
}

/// General country cross-reference service.
pub trait CountryLookup: Send + Sync {
    /// Translate `code` between schemes; `None` when it cannot be resolved.
    fn lookup(&self, code: &str, from: CodeScheme, to: CodeScheme) -> Option<String>;
}

#[derive(Debug, Clone)]
struct Country {
    iso2: String,
    iso3: String,
    name: String,
}

impl Country {
    fn code(&self, scheme: CodeScheme) -> &str {
        match scheme {
            CodeScheme::Iso2 => &self.iso2,
            CodeScheme::Iso3 => &self.iso3,
            CodeScheme::Name => &self.name,
        }
    }
}

/// Cross-reference backed by the embedded ISO 3166-1 table.
#[derive(Debug, Clone)]
pub struct CountryTable {
    countries: Vec<Country>,
    index: HashMap<(CodeScheme, String), usize>,
}

static ISO3166: Lazy<Arc<CountryTable>> =
    Lazy::new(|| Arc::new(CountryTable::parse(include_str!("../../data/iso3166.csv"))));

impl CountryTable {
    pub fn iso3166() -> Arc<CountryTable> {
        Arc::clone(&ISO3166)
    }

    /// Parse `iso2;iso3;name` lines, skipping the header and blank lines.
    /// Lookups are case-insensitive on codes and names.
    pub fn parse(text: &str) -> Self {
        let countries: Vec<Country> = text
            .lines()
            .skip(1)
            .filter_map(|line| {
                let mut parts = line.splitn(3, ';');
                let iso2 = parts.next()?.trim();
                let iso3 = parts.next()?.trim();
                let name = parts.next()?.trim();
                if iso2.is_empty() || iso3.is_empty() {
                    return None;
                }
                Some(Country {
                    iso2: iso2.to_string(),
                    iso3: iso3.to_string(),
                    name: name.to_string(),
                })
            })
            .collect();

        let mut index = HashMap::with_capacity(countries.len() * 3);
        for (i, c) in countries.iter().enumerate() {
            for scheme in [CodeScheme::Iso2, CodeScheme::Iso3, CodeScheme::Name] {
                index.insert((scheme, c.code(scheme).to_ascii_uppercase()), i);
            }
        }
        Self { countries, index }
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}

impl CountryLookup for CountryTable {
    fn lookup(&self, code: &str, from: CodeScheme, to: CodeScheme) -> Option<String> {
        let key = code.trim().to_ascii_uppercase();
        if key.is_empty() {
            return None;
        }
        self.index
            .get(&(from, key))
            .map(|&i| self.countries[i].code(to).to_string())
    }
}
