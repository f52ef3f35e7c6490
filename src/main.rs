use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use newsdeck::config::Config;
use newsdeck::dashboard::Dashboard;
use newsdeck::feed::LoadMore;
use newsdeck::model::{CategoryFilter, NewsItem};
use newsdeck::storage::{Database, DatabaseError};
use newsdeck::util::{display_width, truncate_to_width};
use newsdeck::view::relative_age;

/// Width of the title column.
const TITLE_WIDTH: usize = 72;
/// Width of the source column.
const SOURCE_WIDTH: usize = 22;

/// Get the config directory path (~/.config/newsdeck/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("newsdeck");
    Ok(config_dir)
}

/// Create the config directory if missing and restrict it to the current user.
fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    // SEC-007: Set directory permissions on Unix (user-only access)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(config_dir, perms) {
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

    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "newsdeck", version, about = "AI news from many feeds, in one list")]
struct Args {
    /// Configuration file (default: ~/.config/newsdeck/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Ignore a fresh cached snapshot and fetch every feed
    #[arg(long)]
    refresh: bool,

    /// Do not read or write the snapshot cache
    #[arg(long)]
    no_cache: bool,

    /// Delete the cached snapshot before doing anything else
    #[arg(long)]
    clear_cache: bool,

    /// Category tab: all, news, blogs or papers
    #[arg(long, default_value = "all")]
    category: CategoryFilter,

    /// Only show items whose title, summary or author contain TEXT
    #[arg(long, value_name = "TEXT")]
    search: Option<String>,

    /// Maximum items to print (default: items_per_page from the config)
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Ask for more items after loading
    #[arg(long)]
    more: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        eprintln!("Failed to load news. Run again to retry.");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let config_dir = get_config_dir()?;
    ensure_config_dir(&config_dir)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    tracing::debug!(
        feeds = config.feeds.len(),
        relays = config.relays.len(),
        "Configuration loaded"
    );

    let cache = if args.no_cache {
        None
    } else {
        Some(open_cache(&config_dir.join("cache.db")).await?)
    };

    if args.clear_cache {
        if let Some(db) = &cache {
            let removed = db
                .clear_snapshot(&config.cache_key)
                .await
                .context("Failed to clear cache")?;
            println!("{}", if removed { "Cache cleared." } else { "Cache was already empty." });
        }
    }

    let limit = args.limit.unwrap_or(config.items_per_page);
    let dashboard = Dashboard::new(Arc::new(config), cache).context("Failed to create dashboard")?;

    dashboard
        .refresh(args.refresh)
        .await
        .context("Failed to refresh")?;
    dashboard.set_category(args.category);
    if let Some(query) = &args.search {
        dashboard.set_search_query(query);
    }

    if args.more {
        match dashboard.load_more().await.context("Failed to load more")? {
            LoadMore::Extended(snapshot) => {
                tracing::debug!(total = snapshot.len(), "Snapshot extended");
            }
            LoadMore::Exhausted => eprintln!("No more items available."),
        }
    }

    let visible = dashboard.visible();
    if visible.is_empty() {
        println!("No items match.");
        return Ok(());
    }

    let now = Utc::now();
    for item in visible.iter().take(limit) {
        print_item(item, now);
    }
    if visible.len() > limit {
        println!("... {} more (use --limit)", visible.len() - limit);
    }

    Ok(())
}

async fn open_cache(db_path: &Path) -> Result<Database> {
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    match Database::open(db_path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::Locked) => {
            anyhow::bail!(
                "Another instance of newsdeck is writing the cache. Please wait and try again."
            )
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open cache database: {}", e)),
    }
}

fn print_item(item: &NewsItem, now: chrono::DateTime<Utc>) {
    let source = truncate_to_width(&item.source, SOURCE_WIDTH);
    let padding = SOURCE_WIDTH.saturating_sub(display_width(&source));

    println!(
        "{:<10} {}{} {}",
        relative_age(item.published_at, now),
        source,
        " ".repeat(padding),
        truncate_to_width(&item.title, TITLE_WIDTH)
    );
    println!("           {}", item.url);
}
