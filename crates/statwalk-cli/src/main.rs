use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value as JsonValue;
use statwalk_core::{NormalizedTable, SchemaGuard};
use statwalk_extract::{
    player_fixture_rows, scrape_table, table_from_flat_records, type_catalog_from_pages,
    NormalizeOptions, TableNormalizer, TableSelector, STATS_TABLE_SELECTOR,
};
use statwalk_fetch::{FetchConfig, HttpFetcher};
use statwalk_resolve::{CrosswalkConfig, IdentityResolver};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "warn,statwalk=info";

#[derive(Debug, Parser)]
#[command(name = "statwalk")]
#[command(about = "Normalize sports statistics tables and crosswalk player ids")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct TableArgs {
    /// CSS selector for candidate tables.
    #[arg(long, default_value = STATS_TABLE_SELECTOR)]
    selector: String,
    /// Zero-based index among matching tables.
    #[arg(long, default_value_t = 0)]
    index: usize,
    /// Also search tables shipped inside HTML comments.
    #[arg(long)]
    include_commented: bool,
    /// Prepend a deterministic `id` column built from these columns.
    #[arg(long, value_delimiter = ',')]
    id_from: Vec<String>,
}

impl TableArgs {
    fn normalizer(&self) -> TableNormalizer {
        TableNormalizer::new(TableSelector::new(self.selector.clone())).with_options(NormalizeOptions {
            include_commented: self.include_commented,
        })
    }

    fn finish(&self, table: NormalizedTable) -> Result<NormalizedTable> {
        if self.id_from.is_empty() {
            return Ok(table);
        }
        let sources = self.id_from.iter().map(String::as_str).collect::<Vec<_>>();
        Ok(table.with_id_column("id", &sources)?)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Normalize tables from saved HTML pages; all pages must share one column layout.
    Normalize {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        table: TableArgs,
    },
    /// Fetch a page (STATWALK_* env vars configure the client) and normalize one table.
    Scrape {
        url: String,
        #[command(flatten)]
        table: TableArgs,
    },
    /// Flatten a fixture payload's lineups into player rows.
    Lineups {
        payload: PathBuf,
        /// Paginated stat type responses used to name detail columns.
        #[arg(long = "types")]
        types: Vec<PathBuf>,
    },
    /// Match source-A player rows to source-B player rows.
    Crosswalk {
        source_a: PathBuf,
        source_b: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_json(path: &Path) -> Result<JsonValue> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn read_rows(path: &Path) -> Result<Vec<JsonValue>> {
    match read_json(path)? {
        JsonValue::Array(rows) => Ok(rows),
        _ => anyhow::bail!("{} must hold a JSON array of rows", path.display()),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn normalize_files(files: &[PathBuf], args: &TableArgs) -> Result<Vec<JsonValue>> {
    let normalizer = args.normalizer();
    let mut guard = SchemaGuard::new();
    let mut rows = Vec::new();
    for path in files {
        let html = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let table = normalizer
            .normalize(&html, args.index)
            .with_context(|| format!("normalizing {}", path.display()))?;
        let table = args.finish(table)?;
        guard.observe(&table, &path.display().to_string())?;
        if table.is_empty() {
            warn!(file = %path.display(), "table has no rows after filtering");
        }
        info!(file = %path.display(), rows = table.len(), columns = table.columns().len(), "normalized");
        rows.extend(table.to_json_rows());
    }
    Ok(rows)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Normalize { files, table } => {
            let rows = normalize_files(&files, &table)?;
            print_json(&rows)?;
        }
        Commands::Scrape { url, table } => {
            let fetcher = HttpFetcher::new(FetchConfig::from_env())?;
            let normalized = scrape_table(&fetcher, &url, &table.normalizer(), table.index).await?;
            let normalized = table.finish(normalized)?;
            print_json(&normalized.to_json_rows())?;
        }
        Commands::Lineups { payload, types } => {
            let pages = types.iter().map(|p| read_json(p)).collect::<Result<Vec<_>>>()?;
            let catalog = type_catalog_from_pages(&pages)?;
            let rows = player_fixture_rows(&read_json(&payload)?, &catalog);
            if let Some(message) = &rows.plan_gated {
                warn!(%message, "lineups unavailable for this fixture");
            }
            let table = table_from_flat_records(&rows.records)?;
            print_json(&table.to_json_rows())?;
        }
        Commands::Crosswalk {
            source_a,
            source_b,
            config,
        } => {
            let config = match config {
                Some(path) => CrosswalkConfig::from_yaml_path(&path)?,
                None => CrosswalkConfig::default(),
            };
            let resolver = IdentityResolver::new(config);
            let resolution = resolver.resolve_rows(&read_rows(&source_a)?, &read_rows(&source_b)?)?;
            let report = &resolution.players.report;
            for unmatched in &report.entries {
                warn!(
                    id = %unmatched.source_a_id,
                    names = ?unmatched.names,
                    team = %unmatched.team,
                    reason = %unmatched.reason,
                    "unmatched"
                );
            }
            if resolution.players.entries.is_empty() {
                warn!("no crosswalk entries produced");
            }
            print_json(&resolution)?;
        }
    }

    Ok(())
}
