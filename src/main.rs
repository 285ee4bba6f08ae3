//! creator-revenue command-line entrypoint.
//! Links platform sessions, runs connector syncs, and runs attribution passes against
//! the SQLite store named in the config.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use creator_revenue::attribution::AttributionEngine;
use creator_revenue::config::AppConfig;
use creator_revenue::ingest::browser::BrowserDriver;
use creator_revenue::ingest::providers::{self, ConnectorDeps};
use creator_revenue::ingest::sync_user;
use creator_revenue::ingest::webdriver::WebDriverBrowser;
use creator_revenue::metrics::Metrics;
use creator_revenue::model::Platform;
use creator_revenue::store::SqliteStore;
use creator_revenue::vault::{CredentialSet, CredentialVault, VaultCipher};

#[derive(Parser, Debug)]
#[command(name = "creator-revenue")]
#[command(about = "Affiliate revenue sync and content attribution")]
struct Cli {
    /// Config file (default: $REVENUE_CONFIG_PATH, then config/revenue.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print Prometheus metrics when the command finishes
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store (or replace) a platform session for a user
    Link {
        #[arg(long)]
        user: String,
        #[arg(long)]
        platform: Platform,
        /// JSON object of tokens/cookies; "-" reads stdin
        #[arg(long, value_name = "FILE")]
        credentials: PathBuf,
    },

    /// Sync revenue for one or more users
    Sync {
        #[arg(long = "user", required = true)]
        users: Vec<String>,
        /// Restrict to these platforms (default: all)
        #[arg(long)]
        platform: Vec<Platform>,
        /// Trailing window in days
        #[arg(long)]
        days: Option<u32>,
    },

    /// Attribute unattributed revenue to content
    Attribute {
        #[arg(long)]
        user: String,
    },

    /// Show credential health per platform
    Status {
        #[arg(long)]
        user: String,
    },
}

/// Compact logs by default; `LOG_FORMAT=json` switches to structured JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("creator_revenue=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

fn read_credentials(path: &PathBuf) -> Result<CredentialSet> {
    let raw = if path.as_os_str() == "-" {
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s)?;
        s
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    let set: CredentialSet =
        serde_json::from_str(&raw).context("credentials must be a JSON object")?;
    anyhow::ensure!(!set.is_empty(), "credential set is empty");
    Ok(set)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let mut cfg = match &cli.config {
        Some(p) => AppConfig::load_from(p)?,
        None => AppConfig::load_default()?,
    };
    let metrics = Metrics::init(cfg.sync.window_days)?;

    let store = Arc::new(
        SqliteStore::open(&cfg.store.database_path)
            .await
            .context("opening revenue store")?,
    );

    match cli.command {
        Command::Link {
            user,
            platform,
            credentials,
        } => {
            let set = read_credentials(&credentials)?;
            let vault =
                CredentialVault::new(store.clone(), VaultCipher::process_shared(&cfg.vault)?);
            vault.save(&user, platform, &set).await?;
            info!(%platform, entries = set.len(), "credentials linked");
        }

        Command::Sync {
            users,
            platform,
            days,
        } => {
            if let Some(d) = days {
                cfg.sync.window_days = d;
            }
            let vault =
                CredentialVault::new(store.clone(), VaultCipher::process_shared(&cfg.vault)?);
            let browser: Option<Arc<dyn BrowserDriver>> = match &cfg.browser.webdriver_url {
                Some(url) => Some(Arc::new(WebDriverBrowser::new(
                    url,
                    &cfg.browser,
                    &cfg.http.user_agent,
                )?)),
                None => {
                    warn!("no webdriver_url configured; browser strategies disabled");
                    None
                }
            };
            let deps = ConnectorDeps::from_config(
                &cfg,
                vault,
                store.clone(),
                cfg.http.build_client()?,
                browser,
            );
            let platforms = if platform.is_empty() {
                Platform::ALL.to_vec()
            } else {
                platform
            };

            let mut set = JoinSet::new();
            for user in users {
                let deps = deps.clone();
                let platforms = platforms.clone();
                set.spawn(async move {
                    let connectors: Vec<_> = platforms
                        .iter()
                        .map(|p| providers::connector(*p, &deps))
                        .collect();
                    let reports = sync_user(&connectors, &user).await;
                    (user, reports)
                });
            }
            while let Some(joined) = set.join_next().await {
                let (user, reports) = joined?;
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "user": user,
                        "reports": reports,
                    }))?
                );
            }
        }

        Command::Attribute { user } => {
            let engine =
                AttributionEngine::new(store.clone(), store.clone(), cfg.attribution.clone());
            let summary = engine.attribute(&user).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Status { user } => {
            let vault =
                CredentialVault::new(store.clone(), VaultCipher::process_shared(&cfg.vault)?);
            for p in Platform::ALL {
                match vault.entry(&user, p).await {
                    Ok(Some(e)) => println!(
                        "{p:<8} {:<10} last_sync={} {}",
                        e.status,
                        e.last_sync_at
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "never".into()),
                        e.last_error.unwrap_or_default()
                    ),
                    Ok(None) => println!("{p:<8} not linked"),
                    Err(e) => println!("{p:<8} unreadable ({e})"),
                }
            }
        }
    }

    if cli.print_metrics {
        println!("{}", metrics.render());
    }
    Ok(())
}
