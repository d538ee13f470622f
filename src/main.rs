use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use reqwest::Client;
use std::{collections::BTreeSet, fs, path::PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use wdipanel::{
    cache::{CacheKey, PanelCache},
    catalog::IndicatorCatalog,
    config::Settings,
    error::ConfigurationError,
    fetch,
    panel::{read_csv, to_parquet_bytes, write_csv},
    process::Converter,
    rebase::FactorTable,
    regions::RegionCodeMap,
};

#[derive(Parser)]
#[command(name = "wdipanel", version, about = "Fetch, cache and clean World Bank WDI panels")]
struct Cli {
    /// YAML settings file; defaults apply when omitted.
    #[arg(long, global = true, env = "WDIPANEL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch raw series from the WDI API and store them under a cache key.
    Download {
        #[arg(long, value_delimiter = ',', required = true)]
        indicators: Vec<String>,
        #[arg(long)]
        start: Option<i32>,
        #[arg(long)]
        end: Option<i32>,
        #[arg(long)]
        cache_key: Option<String>,
    },
    /// Store a manually downloaded tidy-wide CSV under a cache key.
    Import {
        csv: PathBuf,
        #[arg(long)]
        cache_key: Option<String>,
    },
    /// Convert cached raw series into clean panels.
    Convert {
        #[arg(required = true)]
        tags: Vec<String>,
        #[arg(long)]
        cache_key: Option<String>,
        /// Write `<code>.<format>` per indicator into this directory.
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Format::Parquet)]
        format: Format,
    },
    /// Print the indicator catalog.
    Catalog,
    /// List cached versions.
    Versions {
        #[arg(long, default_value = "wdi")]
        name: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Parquet,
    Csv,
}

impl Format {
    fn extension(self) -> &'static str {
        match self {
            Format::Parquet => "parquet",
            Format::Csv => "csv",
        }
    }
}

fn resolve_key(settings: &Settings, flag: Option<String>) -> Result<CacheKey> {
    match flag {
        Some(k) => k.parse(),
        None => settings.cache_key(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    // ─── 2) settings & shared configuration ──────────────────────────
    let cli = Cli::parse();
    let settings = Settings::load_or_default(cli.config.as_deref())?;
    let catalog = IndicatorCatalog::wdi();
    let cache = PanelCache::new(&settings.cache_dir)?;

    match cli.command {
        Command::Download {
            indicators,
            start,
            end,
            cache_key,
        } => {
            let key = resolve_key(&settings, cache_key)?;
            let start = start.unwrap_or(settings.start_year);
            let end = end.unwrap_or(settings.end_year);
            if start > end {
                bail!("--start {} is after --end {}", start, end);
            }

            let mut codes = BTreeSet::new();
            for tag in &indicators {
                let entry = catalog.get(&catalog.resolve_alias(tag)).ok_or_else(|| {
                    ConfigurationError::UnknownIndicator {
                        tag: tag.clone(),
                        valid: catalog.codes(),
                    }
                })?;
                codes.insert(entry.code.to_string());
            }

            info!(%key, indicators = codes.len(), start, end, "downloading");
            let client = Client::builder()
                .user_agent(concat!("wdipanel/", env!("CARGO_PKG_VERSION")))
                .build()?;
            let panel = fetch::fetch_panel(&client, &codes, start, end).await?;
            let manifest = cache.store_panel(&key, &panel)?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }

        Command::Import { csv, cache_key } => {
            let key = resolve_key(&settings, cache_key)?;
            let panel = read_csv(&csv)?;
            let manifest = cache.store_panel(&key, &panel)?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }

        Command::Convert {
            tags,
            cache_key,
            out_dir,
            format,
        } => {
            let key = resolve_key(&settings, cache_key)?;
            let raw = cache.load_panel(&key)?.with_context(|| {
                format!(
                    "nothing cached under {}; run `download` or `import` first",
                    key
                )
            })?;

            let factors = match &settings.factors_path {
                Some(p) => FactorTable::load(p)?,
                None => {
                    warn!("no factors_path configured; rebased indicators will fail");
                    FactorTable::new()
                }
            };
            let regions = RegionCodeMap::iso(settings.region_overrides.clone());
            let converter =
                Converter::new(catalog, &regions, &settings.aggregation_rules, &factors);

            if let Some(dir) = &out_dir {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating output directory {}", dir.display()))?;
            }

            let mut failed = 0;
            for (tag, result) in tags.iter().zip(converter.convert_many(&raw, &tags)) {
                let conversion = match result {
                    Ok(c) => c,
                    Err(e) => {
                        error!(tag = %tag, "{}", e);
                        failed += 1;
                        continue;
                    }
                };
                if let Some(dir) = &out_dir {
                    let path = dir.join(format!(
                        "{}.{}",
                        conversion.metadata.code,
                        format.extension()
                    ));
                    match format {
                        Format::Parquet => {
                            let bytes = to_parquet_bytes(&conversion.panel)?;
                            fs::write(&path, bytes)
                                .with_context(|| format!("writing {}", path.display()))?;
                        }
                        Format::Csv => write_csv(&conversion.panel, &path)?,
                    }
                    info!(path = %path.display(), "wrote panel");
                }
                println!("{}", serde_json::to_string(&conversion.metadata)?);
            }
            if failed > 0 {
                bail!("{} of {} conversions failed", failed, tags.len());
            }
        }

        Command::Catalog => {
            for e in catalog.entries() {
                println!(
                    "{:<20} {:<12} scale={:<6} aggregate={:<5} rebase={:<5} {}",
                    e.code,
                    e.alias.unwrap_or("-"),
                    e.scale,
                    e.aggregate,
                    e.rebase,
                    e.unit
                );
            }
        }

        Command::Versions { name } => {
            for version in cache.versions(&name)? {
                let key = CacheKey::new(&name, &version)?;
                match cache.manifest(&key)? {
                    Some(m) => println!(
                        "{}\t{} indicators\t{} cells\tstored {}",
                        key,
                        m.indicators.len(),
                        m.cells,
                        m.stored_at.to_rfc3339()
                    ),
                    None => println!("{}", key),
                }
            }
        }
    }
    Ok(())
}
