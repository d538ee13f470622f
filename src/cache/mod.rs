// src/cache/mod.rs

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use glob::glob;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, info};

use crate::panel::{from_parquet_bytes, to_parquet_bytes, IndicatorPanel};

static SEGMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("cache key regex should parse")
});

/// Explicit, human-chosen address of a cached raw panel, written `name@version`
/// (e.g. `wdi@2024-09-19`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub name: String,
    pub version: String,
}

impl CacheKey {
    pub fn new(name: &str, version: &str) -> Result<Self> {
        for (what, seg) in [("name", name), ("version", version)] {
            if !SEGMENT_RE.is_match(seg) {
                bail!("invalid cache key {}: `{}`", what, seg);
            }
        }
        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

impl FromStr for CacheKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('@') {
            Some((name, version)) => Self::new(name, version),
            None => bail!("cache key `{}` must look like name@version", s),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Sidecar describing a stored panel. Never read by the conversion itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub key: String,
    pub indicators: Vec<String>,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
    pub cells: usize,
    pub stored_at: DateTime<Utc>,
}

/// Directory-backed store of raw panels: `<dir>/<name>/<version>.parquet`.
pub struct PanelCache {
    dir: PathBuf,
}

impl PanelCache {
    /// Open the cache at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating cache directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn blob_path(&self, key: &CacheKey) -> PathBuf {
        self.dir
            .join(&key.name)
            .join(format!("{}.parquet", key.version))
    }

    fn manifest_path(&self, key: &CacheKey) -> PathBuf {
        self.dir
            .join(&key.name)
            .join(format!("{}.json", key.version))
    }

    /// Raw bytes for `key`, or `None` if nothing is stored under it.
    pub fn load(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let path = self.blob_path(key);
        match fs::read(&path) {
            Ok(bytes) => {
                debug!(%key, bytes = bytes.len(), "cache hit");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    /// Atomically write `bytes` under `key`, replacing any previous blob.
    pub fn store(&self, key: &CacheKey, bytes: &[u8]) -> Result<()> {
        let final_path = self.blob_path(key);
        write_atomic(&final_path, bytes)?;
        info!(%key, path = %final_path.display(), bytes = bytes.len(), "stored cache blob");
        Ok(())
    }

    pub fn load_panel(&self, key: &CacheKey) -> Result<Option<IndicatorPanel>> {
        match self.load(key)? {
            Some(bytes) => from_parquet_bytes(bytes)
                .with_context(|| format!("decoding cached panel {}", key))
                .map(Some),
            None => Ok(None),
        }
    }

    /// Store `panel` under `key` and write its manifest.
    pub fn store_panel(&self, key: &CacheKey, panel: &IndicatorPanel) -> Result<Manifest> {
        let bytes = to_parquet_bytes(panel)?;
        self.store(key, &bytes)?;

        let years = panel.years();
        let manifest = Manifest {
            key: key.to_string(),
            indicators: panel.indicators().into_iter().map(str::to_string).collect(),
            first_year: years.first().copied(),
            last_year: years.last().copied(),
            cells: panel.len(),
            stored_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&manifest)?;
        write_atomic(&self.manifest_path(key), &json)?;
        Ok(manifest)
    }

    pub fn manifest(&self, key: &CacheKey) -> Result<Option<Manifest>> {
        let path = self.manifest_path(key);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing {}", path.display()))
                .map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    /// Stored versions for `name`, sorted.
    pub fn versions(&self, name: &str) -> Result<Vec<String>> {
        let pattern = format!("{}/{}/*.parquet", self.dir.display(), name);
        let mut out = Vec::new();
        for entry in glob(&pattern).context("invalid glob pattern for cache versions")? {
            let path = entry?;
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                out.push(stem.to_string());
            }
        }
        out.sort();
        Ok(out)
    }
}

fn write_atomic(final_path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("could not create `{}`", parent.display()))?;
    }
    let tmp = final_path.with_extension("tmp");
    fs::write(&tmp, bytes).with_context(|| format!("writing `{}`", tmp.display()))?;
    fs::rename(&tmp, final_path).with_context(|| {
        format!(
            "failed to rename `{}` to `{}`",
            tmp.display(),
            final_path.display()
        )
    })?;
    Ok(())
}
