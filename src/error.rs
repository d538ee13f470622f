// src/error.rs

use thiserror::Error;

/// Raised when an indicator tag cannot be served by the catalog or the raw panel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("unknown indicator `{tag}`. Possible indicators are:\n{}", .valid.join("\n"))]
    UnknownIndicator { tag: String, valid: Vec<String> },

    #[error("indicator `{code}` is not present in the raw panel. Available indicators are:\n{}", .available.join("\n"))]
    NotInPanel { code: String, available: Vec<String> },

    #[error("invalid setting: {0}")]
    Setting(String),
}

/// Raised when a monetary series cannot be moved to another price basis.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RebasingError {
    #[error("unrecognised price basis `{0}` (expected e.g. `constant 2017 Int$PPP`)")]
    UnknownBasis(String),

    #[error("no {factor} conversion factor for region {region}, year {year} (needed for {base_year} basis, source {source_name})")]
    MissingFactor {
        region: String,
        year: i32,
        factor: &'static str,
        base_year: i32,
        source_name: String,
    },
}

/// Raised by the raw-data fetcher. Surfaced unchanged by the CLI.
#[derive(Error, Debug)]
pub enum UpstreamFetchError {
    #[error("HTTP request for {indicator} failed: {source}")]
    Http {
        indicator: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("API rejected {indicator}: {message}")]
    Api { indicator: String, message: String },

    #[error("could not decode {indicator} page {page}: {source}")]
    Decode {
        indicator: String,
        page: u32,
        #[source]
        source: serde_json::Error,
    },

    #[error("fetch task for {indicator} aborted: {reason}")]
    Task { indicator: String, reason: String },

    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors the conversion pipeline can abort with.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Rebasing(#[from] RebasingError),
}

pub type Result<T> = std::result::Result<T, ConvertError>;
