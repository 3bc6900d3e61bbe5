//! Sectormap CLI: industry lookups against native and third-party taxonomies.
//!
//! Commands:
//! - `industries`: list industries at a level
//! - `stocks`: stocks under an industry code, block code or name
//! - `industry-of`: level breakdown for one stock
//! - `blocks`: stocks grouped by their level-N industry
//! - `concepts`: native concept/style/index blocks
//! - `status`: configured directories and loaded source manifests
//! - `update`: force a refresh of the third-party cache

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use sectormap_core::data::{HttpArchiveDownloader, SourceOrigin};
use sectormap_core::resolver::prepare_third_party;
use sectormap_core::{
    Block, IndustryResolver, IndustrySource, ResolverBuilder, ResolverConfig, StockIndustry,
    Taxonomy,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sectormap",
    about = "Sectormap CLI: A-share industry classification lookups"
)]
struct Cli {
    /// TOML config file. Without it, directories are discovered from the
    /// environment.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// TDX install directory (overrides config and TDXDIR).
    #[arg(long, global = true)]
    tdx_dir: Option<PathBuf>,

    /// Third-party source cache directory.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List industries at a level.
    Industries {
        /// native (tdx) or thirdparty (sws).
        #[arg(long, default_value = "native")]
        taxonomy: Taxonomy,

        /// Level: 0-2 for native, 1-2 for thirdparty.
        #[arg(long, default_value_t = 1)]
        level: u8,
    },
    /// Stocks under an industry, including every sub-industry.
    Stocks {
        /// Classification code, block code, or exact industry name.
        identifier: String,

        #[arg(long, default_value = "native")]
        taxonomy: Taxonomy,
    },
    /// Level-1/level-2 industry of a stock.
    IndustryOf {
        /// Six-digit stock code.
        stock_code: String,

        #[arg(long, default_value = "native")]
        taxonomy: Taxonomy,
    },
    /// Stocks grouped by their industry at a level.
    Blocks {
        #[arg(long, default_value = "native")]
        taxonomy: Taxonomy,

        #[arg(long, default_value_t = 1)]
        level: u8,
    },
    /// Native concept blocks.
    Concepts {
        /// Block type (GN, FG, ZS) or a substring of the block name.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Show configured directories and loaded sources.
    Status,
    /// Force a refresh of the third-party source cache.
    Update,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let json = cli.json;

    match cli.command {
        Commands::Industries { taxonomy, level } => {
            let resolver = build(config, &[taxonomy])?;
            let rows = resolver.list_industries(taxonomy, level)?;
            if json {
                return print_json(&rows);
            }
            if rows.is_empty() {
                println!("No {taxonomy} industries at level {level}");
            }
            for row in &rows {
                println!("{:<10} {}", row.code, row.name);
            }
            Ok(())
        }
        Commands::Stocks {
            identifier,
            taxonomy,
        } => {
            let resolver = build(config, &[taxonomy])?;
            let stocks = resolver.stocks_of(taxonomy, &identifier)?;
            if json {
                return print_json(&stocks);
            }
            if stocks.is_empty() {
                println!("No stocks match '{identifier}' in {taxonomy}");
            }
            for code in &stocks {
                println!("{code}");
            }
            Ok(())
        }
        Commands::IndustryOf {
            stock_code,
            taxonomy,
        } => {
            let resolver = build(config, &[taxonomy])?;
            let info = resolver.industry_of(taxonomy, &stock_code)?;
            if json {
                return print_json(&info);
            }
            match info {
                Some(info) => print_industry(&info),
                None => println!("Stock {stock_code} not found in {taxonomy}"),
            }
            Ok(())
        }
        Commands::Blocks { taxonomy, level } => {
            let resolver = build(config, &[taxonomy])?;
            let blocks = resolver.blocks(taxonomy, level)?;
            if json {
                return print_json(&blocks);
            }
            print_blocks(&blocks);
            Ok(())
        }
        Commands::Concepts { filter } => {
            let resolver = build(config, &[Taxonomy::Native])?;
            let blocks = resolver.concept_blocks(filter.as_deref())?;
            if json {
                return print_json(&blocks);
            }
            print_blocks(&blocks);
            Ok(())
        }
        Commands::Status => run_status(config, json),
        Commands::Update => run_update(config, json),
    }
}

fn load_config(cli: &Cli) -> Result<ResolverConfig> {
    let mut config = match &cli.config {
        Some(path) => ResolverConfig::from_file(path)?,
        None => ResolverConfig::discover(),
    };
    if let Some(dir) = &cli.tdx_dir {
        config.tdx_dir = dir.clone();
    }
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    Ok(config)
}

fn build(config: ResolverConfig, taxonomies: &[Taxonomy]) -> Result<IndustryResolver> {
    Ok(ResolverBuilder::from_config(config)
        .taxonomies(taxonomies)
        .build()?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_industry(info: &StockIndustry) {
    let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
    println!("Stock:   {} {}", info.stock_code, show(&info.stock_name));
    println!("Level 1: {} ({})", show(&info.l1_name), show(&info.l1_code));
    println!("Level 2: {} ({})", show(&info.l2_name), show(&info.l2_code));
    if let Some(l3) = &info.l3_name {
        println!("Level 3: {l3}");
    }
    if let Some(conflict) = &info.conflict {
        println!(
            "Note:    alternate level 1 is {} ({})",
            conflict.l1_name, conflict.l1_code
        );
    }
}

fn print_blocks(blocks: &[Block]) {
    if blocks.is_empty() {
        println!("No blocks");
        return;
    }
    println!("{:<10} {:<8} {:>6}  Name", "Code", "Type", "Stocks");
    println!("{}", "-".repeat(48));
    for block in blocks {
        println!(
            "{:<10} {:<8} {:>6}  {}",
            block.concept_code,
            block.concept_type,
            block.stocks.len(),
            block.concept_name
        );
    }
}

#[derive(Serialize)]
struct StatusReport {
    config: ResolverConfig,
    sources: Vec<SourceStatus>,
    errors: Vec<String>,
}

#[derive(Serialize)]
struct SourceStatus {
    taxonomy: Taxonomy,
    origin: Option<String>,
    files: Vec<PathBuf>,
    content_hash: String,
    node_count: usize,
    stock_count: usize,
    loaded_at: String,
}

fn run_status(config: ResolverConfig, json: bool) -> Result<()> {
    let mut report = StatusReport {
        config: config.clone(),
        sources: Vec::new(),
        errors: Vec::new(),
    };

    for taxonomy in config.taxonomies.clone() {
        let resolver = match build(config.clone(), &[taxonomy]) {
            Ok(r) => r,
            Err(e) => {
                report.errors.push(format!("{taxonomy}: {e}"));
                continue;
            }
        };
        let Some(manifest) = resolver.manifest(taxonomy) else {
            continue;
        };
        let origin = resolver
            .source(taxonomy)?
            .origin()
            .map(|o| match o {
                SourceOrigin::Bundled => "bundled".to_string(),
                SourceOrigin::Cache => "cache".to_string(),
            });
        report.sources.push(SourceStatus {
            taxonomy,
            origin,
            files: manifest.files.clone(),
            content_hash: manifest.content_hash.clone(),
            node_count: manifest.node_count,
            stock_count: manifest.stock_count,
            loaded_at: manifest.loaded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        });
    }

    if json {
        return print_json(&report);
    }

    println!("TDX dir:     {}", report.config.tdx_dir.display());
    println!("Cache dir:   {}", report.config.cache_dir.display());
    match &report.config.bundled_dir {
        Some(dir) => println!("Bundled dir: {}", dir.display()),
        None => println!("Bundled dir: (none)"),
    }
    println!("Max age:     {} days", report.config.max_age_days);
    println!();
    for source in &report.sources {
        println!(
            "{:<11} {:>6} nodes {:>6} stocks  hash {}  {}",
            source.taxonomy.as_str(),
            source.node_count,
            source.stock_count,
            &source.content_hash[..12.min(source.content_hash.len())],
            source.origin.as_deref().unwrap_or("tdx install"),
        );
    }
    for err in &report.errors {
        eprintln!("Error: {err}");
    }
    Ok(())
}

fn run_update(mut config: ResolverConfig, json: bool) -> Result<()> {
    if !config.auto_download {
        bail!("downloads are disabled in the config (auto_download = false)");
    }
    config.force_update = true;
    info!("forcing third-party refresh into {}", config.cache_dir.display());
    let downloader = HttpArchiveDownloader::new()?;
    let outcome = prepare_third_party(&config, &downloader)?;

    if json {
        return print_json(&serde_json::json!({
            "dir": outcome.dir,
            "refreshed": outcome.refreshed,
            "origin": match outcome.origin {
                SourceOrigin::Bundled => "bundled",
                SourceOrigin::Cache => "cache",
            },
        }));
    }
    if outcome.refreshed {
        println!("Refreshed third-party sources in {}", outcome.dir.display());
    } else {
        println!(
            "Refresh failed; still using sources in {}",
            outcome.dir.display()
        );
    }
    Ok(())
}
