use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use blocksync_core::WebdavClient;
use blocksyncd::config::DaemonConfig;
use blocksyncd::storage::StateStore;
use blocksyncd::sync::engine::{MANUAL_EDIT_REASON, MANUAL_SYNC_REASON, PullOutcome, SyncEngine};
use blocksyncd::sync::notifier::LogNotifier;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "blocksyncd", version, about = "Synchronize blocker lists through WebDAV")]
struct Cli {
    /// Script profile: weibo, heybox or zhihu
    #[arg(long, global = true)]
    profile: Option<String>,

    /// SQLite state database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
enum Command {
    /// Pull the remote document, as on script startup
    Sync,
    /// Upload the local lists, replacing the remote document
    Push {
        #[arg(long, default_value = MANUAL_SYNC_REASON)]
        reason: String,
    },
    /// Replace one list and sync it
    Save {
        list: String,
        entries: Vec<String>,
        #[arg(long, default_value = MANUAL_EDIT_REASON)]
        reason: String,
    },
    /// Print the local state
    Show,
    /// Edit WebDAV connection settings
    Configure {
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("BLOCKSYNC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = DaemonConfig::from_env()?.with_overrides(cli.profile, cli.db);
    let profile = config.script_profile()?;
    let store = StateStore::open(&config.database_path)
        .await
        .with_context(|| format!("failed to open state at {:?}", config.database_path))?;
    let mut engine = SyncEngine::load(WebdavClient::new(), store, profile, LogNotifier)
        .await
        .context("failed to load local state")?;
    info!(
        profile = %engine.profile().name,
        version = %engine.profile().version,
        db = %config.database_path.display(),
        "state loaded"
    );

    match cli.command {
        Command::Sync => {
            let outcome = engine.sync_on_startup().await;
            println!("{outcome}");
            if matches!(outcome, PullOutcome::Failed { .. } | PullOutcome::StoreFailed) {
                anyhow::bail!("sync failed: {outcome}");
            }
        }
        Command::Push { reason } => {
            if !engine.push(&reason).await {
                anyhow::bail!("push failed");
            }
            println!("pushed ({reason})");
        }
        Command::Save {
            list,
            entries,
            reason,
        } => {
            anyhow::ensure!(
                engine.profile().has_list(&list),
                "unknown list {list:?}; {} has {}",
                engine.profile().name,
                engine.profile().list_names.join(", ")
            );
            let mut lists = BTreeMap::new();
            lists.insert(list, entries);
            if !engine.save_and_sync(lists, &reason).await {
                anyhow::bail!("save failed");
            }
            println!("saved");
        }
        Command::Show => {
            let stored_keys = engine
                .store()
                .keys_with_prefix(&format!("{}.", engine.profile().key_prefix))
                .await?;
            let state = engine.state();
            let view = json!({
                "profile": engine.profile().name,
                "scriptVersion": engine.profile().version,
                "lists": state.lists,
                "webdav": {
                    "enabled": state.webdav.enabled,
                    "url": state.webdav.url,
                    "username": state.webdav.username,
                    "passwordSet": !state.webdav.password.is_empty(),
                    "lastSync": state.webdav.last_sync,
                },
                "storedKeys": stored_keys,
            });
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Configure {
            url,
            username,
            password,
            enable,
            disable,
        } => {
            engine
                .update_settings(|settings| {
                    if let Some(url) = url {
                        settings.url = url;
                    }
                    if let Some(username) = username {
                        settings.username = username;
                    }
                    if let Some(password) = password {
                        settings.password = password;
                    }
                    if enable {
                        settings.enabled = true;
                    }
                    if disable {
                        settings.enabled = false;
                    }
                })
                .await
                .context("failed to save webdav settings")?;
            println!("settings saved");
        }
    }
    Ok(())
}
