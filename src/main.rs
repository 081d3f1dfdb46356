//! Tidemark main entry point
//!
//! This is the command-line interface for the Tidemark shop crawler.

use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tidemark::config::{load_brand_ids, load_config_with_hash, Config};
use tidemark::crawler::{Coordinator, DetailMode};
use tracing_subscriber::EnvFilter;

/// Tidemark: incremental product and review snapshots
///
/// The listing phase enumerates every product the shop lists. The detail
/// phase re-fetches products and reviews of the allowed brands and stores a
/// new snapshot only when the content changed.
#[derive(Parser, Debug)]
#[command(name = "tidemark")]
#[command(version)]
#[command(about = "Incremental product and review snapshots", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Which crawl phase to run
    #[arg(long, value_enum, default_value_t = PhaseArg::Detail)]
    phase: PhaseArg,

    /// What the detail phase fetches
    #[arg(long, value_enum, default_value_t = ModeArg::Full)]
    mode: ModeArg,

    /// Brand allow-list file (overrides [brands] file)
    #[arg(long, value_name = "PATH")]
    brands_file: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "find_brands"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "find_brands"])]
    stats: bool,

    /// Print brands found in the first N leaf categories, in brands-file format
    #[arg(long, value_name = "N", conflicts_with_all = ["dry_run", "stats"])]
    find_brands: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PhaseArg {
    Listing,
    Detail,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Full,
    Products,
    Reviews,
}

impl From<ModeArg> for DetailMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Full => DetailMode::Full,
            ModeArg::Products => DetailMode::Products,
            ModeArg::Reviews => DetailMode::Reviews,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The configured level only applies when no CLI flag sets one
    let loaded = load_config_with_hash(&cli.config);
    let configured_level = loaded
        .as_ref()
        .ok()
        .and_then(|(config, _)| config.logging.level.clone());
    setup_logging(cli.verbose, cli.quiet, configured_level.as_deref());

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match loaded {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let brands_path = cli
        .brands_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.brands.file));

    if cli.dry_run {
        handle_dry_run(&config, &cli, &brands_path)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if let Some(sample) = cli.find_brands {
        handle_find_brands(config, config_hash, sample).await?;
    } else {
        handle_crawl(config, config_hash, &cli, &brands_path).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool, configured: Option<&str>) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match (verbose, configured) {
            (0, Some(level)) => EnvFilter::new(level),
            (0, None) => EnvFilter::new("tidemark=info,warn"),
            (1, _) => EnvFilter::new("tidemark=debug,info"),
            (2, _) => EnvFilter::new("tidemark=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would run
fn handle_dry_run(
    config: &Config,
    cli: &Cli,
    brands_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Tidemark Dry Run ===\n");

    println!("Source: {}", config.source.name);

    println!("\nEndpoints:");
    println!("  Home: {}", config.api.home_url);
    println!("  Listing: {}", config.api.listing_url);
    println!("  Product: {}", config.api.product_url);
    println!("  Reviews: {}", config.api.review_url);
    println!("  Timeout: {}s", config.api.request_timeout);

    println!("\nWorkers:");
    println!("  Listing: {}", config.crawler.listing_workers);
    println!("  Product: {}", config.crawler.product_workers);
    println!("  Review: {}", config.crawler.review_workers);
    println!(
        "  Retry: {} attempts, {}ms {:?} delay",
        config.crawler.max_attempts, config.crawler.retry_delay, config.crawler.retry_backoff
    );

    if !config.api.excluded_categories.is_empty() {
        println!(
            "\nExcluded Categories ({}):",
            config.api.excluded_categories.len()
        );
        for name in &config.api.excluded_categories {
            println!("  - {}", name);
        }
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
    match cli.phase {
        PhaseArg::Listing => println!("✓ Would run listing discovery"),
        PhaseArg::Detail => {
            let brand_ids = load_brand_ids(brands_path)?;
            println!(
                "✓ Would run a {:?} detail crawl for {} brands from {}",
                cli.mode,
                brand_ids.len(),
                brands_path.display()
            );
        }
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use tidemark::output::{load_statistics, print_statistics};
    use tidemark::storage::SqliteStorage;

    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage, 10)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --find-brands mode: prints brand ids found in listings
async fn handle_find_brands(
    config: Config,
    config_hash: String,
    sample: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = Coordinator::from_config(config, config_hash)?;
    let brands = coordinator.discover_brands(sample).await?;

    println!("# Brands found in the first {} leaf categories", sample);
    for (brand_id, name) in &brands {
        println!("{:<7}# {}", brand_id, name);
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: String,
    cli: &Cli,
    brands_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = Coordinator::from_config(config, config_hash)?;

    let result = match cli.phase {
        PhaseArg::Listing => {
            tracing::info!("Starting listing discovery");
            coordinator.run_listing_phase().await
        }
        PhaseArg::Detail => {
            let brand_ids = load_brand_ids(brands_path)?;
            tracing::info!(
                "Starting {:?} detail crawl for {} brands",
                cli.mode,
                brand_ids.len()
            );
            coordinator
                .run_detail_phase(cli.mode.into(), &brand_ids)
                .await
        }
    };

    match result {
        Ok(summary) => {
            tracing::info!(
                "Crawl completed: {} items, {} failed",
                summary.metrics.processed,
                summary.metrics.failed
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
