use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use curator::api::{ApiClient, BearerCache};
use curator::config::{Config, ConfigError};
use curator::curation::{CurationLoop, CurationOutcome, Curator};
use curator::oauth::Signer;
use curator::publish::{CommandRenderer, DigestPublisher, IpmaForecast, QuotePublisher};
use curator::storage::{
    CuratedItem, CurationState, Database, DatabaseError, NewQuote, REVIEW_PAGE_SIZE,
};

/// Get the config directory path (~/.config/curator/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("curator"))
}

#[derive(Parser, Debug)]
#[command(
    name = "curator",
    about = "Curates top posts from a roster of accounts and publishes quotes and weather digests"
)]
struct Args {
    /// Config file (default: ~/.config/curator/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database file (default: ~/.config/curator/curator.db)
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed sources if none exist, then curate on an interval until interrupted
    Serve,
    /// Run a single curation firing
    Curate,
    /// Publish the quote due next as an image
    PublishQuote,
    /// Publish the daily weather digest
    PublishDigest,
    /// Resolve the configured seed handles and store them as sources
    Seed,
    /// Import quotes from a TOML file of [[quote]] tables
    ImportQuotes {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Inspect and decide curated items
    Review {
        #[command(subcommand)]
        action: ReviewCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ReviewCommand {
    /// List curated items, newest first
    List {
        /// Review state (default: unscreened)
        #[arg(long, conflicts_with = "handle")]
        state: Option<CurationState>,

        /// Only items from this account, in any state
        #[arg(long)]
        handle: Option<String>,

        /// Only items older than this item id
        #[arg(long, value_name = "ITEM_ID")]
        older_than: Option<String>,

        #[arg(long, default_value_t = REVIEW_PAGE_SIZE)]
        limit: i64,
    },
    /// Record a review decision for an item
    Set {
        item_id: String,
        state: CurationState,
    },
}

/// Shape of an import file.
#[derive(Debug, Deserialize)]
struct QuoteFile {
    #[serde(default)]
    quote: Vec<NewQuote>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", config_dir.display());
    }

    // User-only access: the directory may hold credentials
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(&config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = args
        .database
        .clone()
        .unwrap_or_else(|| config_dir.join("curator.db"));
    let db = open_database(&db_path).await?;

    match args.command {
        Command::Serve => {
            let curator = Curator::new(db, api_client(&config)?, config.curation_settings());
            let seeded = curator
                .seed_if_empty(&config.seed_handles)
                .await
                .context("Failed to seed sources")?;
            if seeded > 0 {
                println!("Seeded {} sources", seeded);
            }
            CurationLoop::new(curator, config.curation_interval())
                .run_until(shutdown_signal())
                .await;
        }
        Command::Curate => {
            let curator = Curator::new(db, api_client(&config)?, config.curation_settings());
            match curator.run_curation().await.context("Curation failed")? {
                CurationOutcome::NoSources => println!("No sources; run `curator seed` first"),
                CurationOutcome::FetchFailed { handle } => {
                    println!("@{}: timeline fetch failed, marked as attempted", handle)
                }
                CurationOutcome::Merged {
                    handle,
                    fetched,
                    outcome,
                } => println!(
                    "@{}: fetched {}, {} new, {} refreshed, {} already reviewed",
                    handle, fetched, outcome.inserted, outcome.refreshed, outcome.untouched
                ),
            }
        }
        Command::PublishQuote => {
            let renderer = CommandRenderer::from_command_line(&config.render_command)
                .context("render_command is not set in the config file")?;
            let publisher = QuotePublisher::new(db, api_client(&config)?, renderer);
            println!("{}", publisher.publish_quote().await);
        }
        Command::PublishDigest => {
            let forecast = IpmaForecast::new(&config.weather_base_url, config.request_timeout())
                .context("Failed to build weather client")?;
            let publisher = DigestPublisher::new(forecast, api_client(&config)?);
            println!("{}", publisher.publish_digest().await);
        }
        Command::Seed => {
            let curator = Curator::new(db, api_client(&config)?, config.curation_settings());
            let resolved = curator
                .seed(&config.seed_handles)
                .await
                .context("Failed to store sources")?;
            println!(
                "Resolved {} of {} handles",
                resolved,
                config.seed_handles.len()
            );
        }
        Command::ImportQuotes { file } => {
            let inserted = import_quotes(&db, &file).await?;
            println!("Imported {} new quotes", inserted);
        }
        Command::Review { action } => review(&db, action).await?,
    }

    Ok(())
}

async fn open_database(path: &Path) -> Result<Database> {
    let path_str = path
        .to_str()
        .with_context(|| format!("Database path is not valid UTF-8: {}", path.display()))?;
    match Database::open(path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: the database is locked by another process.");
            eprintln!("Wait for it to finish or check for a stale lock on:");
            eprintln!("  {}", path.display());
            std::process::exit(1);
        }
        Err(e) => Err(e).context("Failed to open database"),
    }
}

/// Build the platform client. Missing credentials end the process.
fn api_client(config: &Config) -> Result<ApiClient> {
    let credentials = match config.credentials() {
        Ok(credentials) => credentials,
        Err(e @ ConfigError::MissingCredential { .. }) => {
            tracing::error!(error = %e, "Configuration incomplete");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Failed to resolve credentials"),
    };
    ApiClient::new(
        config.api_settings(),
        Signer::new(credentials),
        BearerCache::new(),
    )
    .context("Failed to build API client")
}

async fn import_quotes(db: &Database, file: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read quote file: {}", file.display()))?;
    let parsed: QuoteFile = toml::from_str(&content)
        .with_context(|| format!("Invalid quote file: {}", file.display()))?;
    if parsed.quote.is_empty() {
        anyhow::bail!("No [[quote]] entries in {}", file.display());
    }
    db.insert_quotes(&parsed.quote)
        .await
        .context("Failed to store quotes")
}

async fn review(db: &Database, action: ReviewCommand) -> Result<()> {
    match action {
        ReviewCommand::List {
            state,
            handle,
            older_than,
            limit,
        } => {
            let items = match handle {
                Some(handle) => db
                    .curated_by_handle(&handle, older_than.as_deref(), limit)
                    .await
                    .context("Failed to list curated items")?,
                None => db
                    .curated_by_state(
                        state.unwrap_or(CurationState::Unscreened),
                        older_than.as_deref(),
                        limit,
                    )
                    .await
                    .context("Failed to list curated items")?,
            };
            if items.is_empty() {
                println!("No curated items");
            }
            for item in &items {
                print_item(item);
            }
        }
        ReviewCommand::Set { item_id, state } => {
            let previous = db
                .set_curated_state(&item_id, state, Utc::now().timestamp())
                .await
                .with_context(|| format!("Failed to update {}", item_id))?;
            println!("{}: {} -> {}", item_id, previous, state);
        }
    }
    Ok(())
}

fn print_item(item: &CuratedItem) {
    let selected = item
        .selected_at
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{}  @{}  [{}]  fav {} / rt {}  selected {}",
        item.item_id,
        item.handle,
        item.state,
        item.favorite_count.unwrap_or(0),
        item.repost_count.unwrap_or(0),
        selected
    );
    println!("    {}", item.text.replace('\n', " "));
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
