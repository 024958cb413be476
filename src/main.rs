//! # Review Lens CLI (`rlens`)
//!
//! Collects App Store reviews into a local SQLite database and analyzes
//! them. Every command the HTTP API offers is also available here.
//!
//! ## Usage
//!
//! ```bash
//! rlens --config ./config/rlens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rlens init` | Create the SQLite database and run schema migrations |
//! | `rlens collect <app_id>` | Fetch a sample of reviews and store the new ones |
//! | `rlens reviews <app_id>` | Print the newest stored reviews |
//! | `rlens metrics <app_id>` | Mean rating and star histogram |
//! | `rlens insights <app_id>` | Sentiment, keywords and recommendations |
//! | `rlens download <app_id>` | Export stored reviews as CSV or JSON |
//! | `rlens report <app_id>` | Write the HTML report |
//! | `rlens stats` | Database overview |
//! | `rlens serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Collect 200 reviews for a US app, falling back to RSS if needed
//! rlens collect 310633997 --how-many 200
//!
//! # Only use the RSS feed, for the UK store
//! rlens collect 310633997 --country gb --source rss
//!
//! # Export as JSON
//! rlens download 310633997 --format json --output ./out/reviews.json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use review_lens::{collect, config, insights, metrics, report, server, stats, store};

/// Review Lens: App Store review collection and analysis.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rlens.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rlens",
    about = "Review Lens — collect and analyze App Store reviews",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rlens.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// App and storefront selection shared by the per-app commands.
#[derive(clap::Args)]
struct AppArgs {
    /// Numeric App Store id (e.g. `310633997`).
    app_id: String,

    /// Two-letter storefront country code.
    #[arg(long, default_value = "us")]
    country: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the reviews table. Safe to run
    /// more than once.
    Init,

    /// Fetch a sample of reviews and store the ones not seen before.
    Collect {
        #[command(flatten)]
        app: AppArgs,

        /// Number of reviews to sample (1–1000).
        #[arg(long, default_value_t = 100)]
        how_many: usize,

        /// Upstream source: `auto` (scraper, then RSS), `scraper`, or `rss`.
        #[arg(long, default_value = "auto")]
        source: String,
    },

    /// Print the newest stored reviews.
    Reviews {
        #[command(flatten)]
        app: AppArgs,

        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Mean rating and star histogram.
    Metrics {
        #[command(flatten)]
        app: AppArgs,
    },

    /// Sentiment breakdown, keywords and recommendations.
    Insights {
        #[command(flatten)]
        app: AppArgs,
    },

    /// Export all stored reviews for an app.
    Download {
        #[command(flatten)]
        app: AppArgs,

        /// `csv` or `json`.
        #[arg(long, default_value = "csv")]
        format: String,

        /// Output path. Defaults to `reviews_<app>_<country>.<ext>`.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Render the report (metrics, charts, insights).
    Report {
        #[command(flatten)]
        app: AppArgs,

        /// `html`, `json` or `csv`.
        #[arg(long, default_value = "html")]
        format: String,

        /// Output path. Defaults to `report_<app>_<country>.<ext>`.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show what has been collected.
    Stats,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_logging(&cfg.log.level)?;

    match cli.command {
        Commands::Init => {
            let store = store::ReviewStore::open(&cfg.db).await?;
            store.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Collect {
            app,
            how_many,
            source,
        } => {
            collect::run_collect(&cfg, &app.app_id, &app.country, how_many, &source).await?;
        }
        Commands::Reviews { app, limit } => {
            report::run_reviews(&cfg, &app.app_id, &app.country, limit).await?;
        }
        Commands::Metrics { app } => {
            metrics::run_metrics(&cfg, &app.app_id, &app.country).await?;
        }
        Commands::Insights { app } => {
            insights::run_insights(&cfg, &app.app_id, &app.country).await?;
        }
        Commands::Download {
            app,
            format,
            output,
        } => {
            report::run_download(&cfg, &app.app_id, &app.country, &format, output).await?;
        }
        Commands::Report {
            app,
            format,
            output,
        } => {
            report::run_report(&cfg, &app.app_id, &app.country, &format, output).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over `[log].level`. Logs go to stderr; command output
/// stays on stdout.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}
