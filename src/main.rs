use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use rssagg::config::Config;
use rssagg::scraper::Scraper;
use rssagg::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(name = "rssagg", version, about = "RSS aggregator: scrape feeds, read posts from the ones you follow")]
struct Args {
    /// Config file (default: ~/.config/rssagg/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database file, overrides config and DATABASE_PATH
    #[arg(long, global = true, value_name = "FILE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scraper until interrupted
    Serve {
        /// Feeds fetched in parallel per cycle
        #[arg(long)]
        concurrency: Option<usize>,
        /// Seconds between cycle starts
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Run a single scrape cycle and print what it did
    Scrape {
        /// Feeds fetched in this cycle
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),
    /// Register and list feeds
    #[command(subcommand)]
    Feed(FeedCommand),
    /// Follow and unfollow feeds
    #[command(subcommand)]
    Follow(FollowCommand),
    /// Newest posts from the feeds a user follows
    Posts {
        #[arg(long)]
        api_key: String,
        /// Number of posts (default 10, max 500)
        #[arg(long)]
        limit: Option<i64>,
    },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Create a user and print its API key
    Create { name: String },
    /// Show the user owning an API key
    Show {
        #[arg(long)]
        api_key: String,
    },
}

#[derive(Subcommand, Debug)]
enum FeedCommand {
    /// Register a feed and follow it
    Add {
        #[arg(long)]
        api_key: String,
        name: String,
        url: String,
    },
    /// List every registered feed
    List,
}

#[derive(Subcommand, Debug)]
enum FollowCommand {
    /// Follow an existing feed
    Add {
        #[arg(long)]
        api_key: String,
        feed_id: i64,
    },
    /// List the feeds a user follows
    List {
        #[arg(long)]
        api_key: String,
    },
    /// Stop following a feed
    Remove {
        #[arg(long)]
        api_key: String,
        follow_id: i64,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config.clone().or_else(Config::default_path) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env();
    if let Some(database) = &args.database {
        config.database_path = database.clone();
    }
    Ok(config)
}

async fn open_database(config: &Config) -> Result<Database> {
    let path = config
        .database_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    match Database::open(path).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => Err(anyhow::anyhow!(
            "Database '{}' is locked by another process. Please try again.",
            path
        )),
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

async fn serve(
    db: Database,
    mut config: Config,
    concurrency: Option<usize>,
    interval_secs: Option<u64>,
) -> Result<()> {
    if let Some(concurrency) = concurrency {
        config.concurrency = concurrency;
    }
    if let Some(interval_secs) = interval_secs {
        config.interval_secs = interval_secs;
    }
    config.validate()?;

    let scraper = Scraper::new(db, config.scraper_settings()?)
        .context("Failed to build HTTP client")?;
    let handle = scraper.spawn();

    shutdown_signal()
        .await
        .context("Failed to listen for shutdown signals")?;
    tracing::info!("Shutdown requested, waiting for the current cycle to finish");
    handle.shutdown().await;

    Ok(())
}

async fn scrape_once(db: Database, mut config: Config, concurrency: Option<usize>) -> Result<()> {
    if let Some(concurrency) = concurrency {
        config.concurrency = concurrency;
    }
    config.validate()?;

    let scraper = Scraper::new(db, config.scraper_settings()?)
        .context("Failed to build HTTP client")?;
    let report = scraper
        .run_cycle()
        .await
        .context("Failed to select feeds to fetch")?;
    commands::print_cycle(&report)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let db = open_database(&config).await?;

    match args.command {
        Command::Serve {
            concurrency,
            interval_secs,
        } => serve(db, config, concurrency, interval_secs).await,
        Command::Scrape { concurrency } => scrape_once(db, config, concurrency).await,
        Command::User(UserCommand::Create { name }) => commands::create_user(&db, &name).await,
        Command::User(UserCommand::Show { api_key }) => commands::show_user(&db, &api_key).await,
        Command::Feed(FeedCommand::Add { api_key, name, url }) => {
            commands::add_feed(&db, &api_key, &name, &url).await
        }
        Command::Feed(FeedCommand::List) => commands::list_feeds(&db).await,
        Command::Follow(FollowCommand::Add { api_key, feed_id }) => {
            commands::follow_feed(&db, &api_key, feed_id).await
        }
        Command::Follow(FollowCommand::List { api_key }) => {
            commands::list_follows(&db, &api_key).await
        }
        Command::Follow(FollowCommand::Remove { api_key, follow_id }) => {
            commands::unfollow(&db, &api_key, follow_id).await
        }
        Command::Posts { api_key, limit } => commands::list_posts(&db, &api_key, limit).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_feed_add() {
        let args = Args::try_parse_from([
            "rssagg",
            "--database",
            "/tmp/x.db",
            "feed",
            "add",
            "--api-key",
            "abc",
            "Blog",
            "https://example.com/rss",
        ])
        .unwrap();

        assert_eq!(args.database, Some(PathBuf::from("/tmp/x.db")));
        match args.command {
            Command::Feed(FeedCommand::Add { api_key, name, url }) => {
                assert_eq!(api_key, "abc");
                assert_eq!(name, "Blog");
                assert_eq!(url, "https://example.com/rss");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_posts_requires_api_key() {
        assert!(Args::try_parse_from(["rssagg", "posts"]).is_err());
    }
}
