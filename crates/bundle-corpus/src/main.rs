//! # Bundle Corpus CLI (`bcx`)
//!
//! The `bcx` binary is the primary interface for Bundle Corpus. It provides
//! commands for database initialization, ingestion of extraction files,
//! duplicate analysis, app similarity, and corpus maintenance.
//!
//! ## Usage
//!
//! ```bash
//! bcx --config ./config/bcx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bcx init` | Create the SQLite database and run schema migrations |
//! | `bcx ingest <PATH>...` | Ingest extraction files or directories |
//! | `bcx analyze` | Build the full analysis report |
//! | `bcx duplicates` | Top shared words or resources |
//! | `bcx similar <A> <B>` | Similarity of two apps |
//! | `bcx search <PATTERN>` | Substring search over canonical words |
//! | `bcx apps` | List ingested apps |
//! | `bcx remove <APP>` | Remove one app |
//! | `bcx prune` | Drop words and resources no app references |
//! | `bcx export` | Legacy flat word view as JSON |
//! | `bcx stats` | Database statistics |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! bcx init --config ./config/bcx.toml
//!
//! # Ingest a directory of extraction files with 8 workers
//! bcx ingest ./extracted --workers 8
//!
//! # Write the JSON report and print a summary
//! bcx analyze --output ./reports/analysis.json
//!
//! # Shared resources across at least 3 apps
//! bcx duplicates --kind resources --min-apps 3
//!
//! # Shared error messages only
//! bcx duplicates --category error
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use bundle_corpus::config::{self, Config};
use bundle_corpus::progress::ProgressMode;
use bundle_corpus::{analyze, apps, duplicates, export, ingest, migrate, search, similar, stats};
use bundle_corpus_core::models::OnExisting;
use bundle_corpus_core::{CancelFlag, ContentKind};

/// Bundle Corpus CLI: cross-app string and resource deduplication.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/bcx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "bcx",
    about = "Bundle Corpus: cross-app string and resource deduplication",
    version,
    long_about = "Bundle Corpus ingests the strings and hashed resources extracted from \
    application bundles into a shared SQLite corpus, ranks what apps have in common, \
    and scores how similar every pair of apps is."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/bcx.toml`. When the file does not exist,
    /// built-in defaults are used with the database under `./data`.
    #[arg(long, global = true, default_value = "./config/bcx.toml")]
    config: PathBuf,

    /// Log debug diagnostics to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent: running it multiple times is safe.
    Init,

    /// Ingest extraction files.
    ///
    /// Directories are walked recursively and filtered by
    /// `[ingest].include_globs`; files given explicitly are always read.
    /// An app whose file is malformed is reported and skipped.
    Ingest {
        /// Extraction files or directories.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Number of apps processed concurrently.
        #[arg(long)]
        workers: Option<usize>,

        /// What to do with apps already in the corpus.
        #[arg(long, value_enum)]
        on_existing: Option<OnExistingArg>,

        /// Parse and normalize everything without writing to the database.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr. Defaults to `human` on a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Build the analysis report.
    ///
    /// Ranks duplicated words and resources, computes the word, resource
    /// and combined similarity matrices, and derives optimization hints.
    Analyze {
        /// Number of top duplicates per kind.
        #[arg(long)]
        top: Option<usize>,

        /// Minimum number of apps an item must appear in.
        #[arg(long)]
        min_apps: Option<usize>,

        /// Restrict the per-app tables and similarity matrices to these
        /// app hashes (comma-separated).
        #[arg(long, value_delimiter = ',')]
        apps: Vec<String>,

        /// Write the JSON report to this file.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the JSON report on stdout instead of the summary.
        #[arg(long)]
        json: bool,
    },

    /// Show the top duplicated words or resources.
    Duplicates {
        #[arg(long, value_enum, default_value = "words")]
        kind: KindArg,

        #[arg(long)]
        top: Option<usize>,

        #[arg(long)]
        min_apps: Option<usize>,

        /// Only items of this category (e.g. `error`, `url`, `image`).
        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Compare two apps by hash.
    Similar {
        a: String,
        b: String,

        #[arg(long)]
        json: bool,
    },

    /// Case-insensitive substring search over canonical words.
    Search {
        pattern: String,

        /// Only words of this category.
        #[arg(long)]
        category: Option<String>,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 50)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// List ingested apps.
    Apps {
        #[arg(long)]
        json: bool,
    },

    /// Remove one app and its associations.
    Remove {
        /// App hash.
        app: String,

        /// Also drop words and resources no remaining app references.
        #[arg(long)]
        prune: bool,
    },

    /// Drop words and resources no app references.
    Prune,

    /// Export the flat word view as JSON.
    Export {
        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show database statistics.
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum OnExistingArg {
    Replace,
    Skip,
    Fail,
}

impl From<OnExistingArg> for OnExisting {
    fn from(arg: OnExistingArg) -> Self {
        match arg {
            OnExistingArg::Replace => OnExisting::Replace,
            OnExistingArg::Skip => OnExisting::Skip,
            OnExistingArg::Fail => OnExisting::Fail,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Words,
    Resources,
}

impl From<KindArg> for ContentKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Words => ContentKind::Word,
            KindArg::Resources => ContentKind::Resource,
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load the config file, or fall back to defaults when it is absent.
fn resolve_config(path: &std::path::Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

/// A cancel flag that Ctrl-C sets. Work in flight finishes its current app
/// or matrix row and stops.
fn cancel_on_ctrl_c() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, finishing in-flight work...");
            flag.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = resolve_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            paths,
            workers,
            on_existing,
            dry_run,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_ingest(
                &cfg,
                &paths,
                workers,
                on_existing.map(OnExisting::from),
                dry_run,
                mode,
                cancel_on_ctrl_c(),
            )
            .await?;
        }
        Commands::Analyze {
            top,
            min_apps,
            apps,
            output,
            json,
        } => {
            analyze::run_analyze(
                &cfg,
                top,
                min_apps,
                &apps,
                output.as_deref(),
                json,
                cancel_on_ctrl_c(),
            )
            .await?;
        }
        Commands::Duplicates {
            kind,
            top,
            min_apps,
            category,
            json,
        } => {
            duplicates::run_duplicates(
                &cfg,
                kind.into(),
                top,
                min_apps,
                category.as_deref(),
                json,
            )
            .await?;
        }
        Commands::Similar { a, b, json } => {
            similar::run_similar(&cfg, &a, &b, json).await?;
        }
        Commands::Search {
            pattern,
            category,
            limit,
            json,
        } => {
            search::run_search(&cfg, &pattern, category.as_deref(), limit, json).await?;
        }
        Commands::Apps { json } => {
            apps::run_list(&cfg, json).await?;
        }
        Commands::Remove { app, prune } => {
            apps::run_remove(&cfg, &app, prune).await?;
        }
        Commands::Prune => {
            apps::run_prune(&cfg).await?;
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref()).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
