//! # History Curator CLI (`curator`)
//!
//! The `curator` binary drives the whole flow: harvest browser history,
//! export it for the analysis backend, run the analysis, and curate the
//! resulting interest tags.
//!
//! ## Usage
//!
//! ```bash
//! curator --config ./config/curator.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `curator init` | Create the database and install default settings |
//! | `curator harvest` | Harvest history into `historyData` |
//! | `curator export` | Harvest, filter, write the export file, notify the backend |
//! | `curator analyze` | Run `/analyze` and load the resulting tags |
//! | `curator ping` | Check that the backend is reachable |
//! | `curator tags <action>` | List and curate tags |
//! | `curator settings <action>` | Show or change settings |
//! | `curator rss <action>` | RSS recommendations and cache control |
//!
//! Logs go to stderr; set `RUST_LOG` to change verbosity.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use history_curator::config::{self, Config};
use history_curator::curator::Curator;
use history_curator::gateway::{Backend, HttpBackend};
use history_curator::harvest::Harvester;
use history_curator::history_source::source_from_config;
use history_curator::progress::ProgressMode;
use history_curator::settings::{self, Settings};
use history_curator::sqlite_store::SqliteStateStore;
use history_curator::{analysis, export, rss};
use history_curator_core::store::StateStore;

/// History Curator: harvest browsing history and curate interest tags.
#[derive(Parser)]
#[command(
    name = "curator",
    about = "History Curator: harvest browsing history and curate interest tags",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/curator.toml`. Built-in defaults are used when
    /// the file does not exist.
    #[arg(long, global = true, default_value = "./config/curator.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and install default settings. Idempotent.
    Init,

    /// Harvest browser history and store it under `historyData`.
    Harvest {
        /// Days to cover. Defaults to the `historyDays` setting.
        #[arg(long)]
        days: Option<u32>,

        /// Progress output: off, human, or json. Defaults to human on a TTY.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Harvest, apply the blacklist, write the export file, notify the backend.
    Export {
        #[arg(long)]
        progress: Option<String>,
    },

    /// Run the backend analysis and load the resulting tags.
    Analyze,

    /// Check whether the backend answers.
    Ping,

    /// List and curate tags.
    Tags {
        #[command(subcommand)]
        action: TagsAction,
    },

    /// Show or change settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// RSS recommendations.
    Rss {
        #[command(subcommand)]
        action: RssAction,
    },
}

#[derive(Subcommand)]
enum TagsAction {
    /// Show the ranked tags.
    List {
        /// Also show deleted tags.
        #[arg(long)]
        deleted: bool,
    },
    /// Reload tags from the latest analysis, discarding local edits.
    Refresh,
    /// Delete a tag (by id or label).
    Delete { tag: String },
    /// Restore a deleted tag (by id or label).
    Restore { tag: String },
    /// Add a custom tag.
    Add { label: String },
    /// Set a tag's count, clamped to the current top count.
    Rank {
        tag: String,
        /// New count.
        #[arg(required_unless_present = "ratio", allow_negative_numbers = true)]
        count: Option<i64>,
        /// Bar-width ratio in [0, 1] instead of an absolute count.
        #[arg(long, conflicts_with = "count")]
        ratio: Option<f64>,
    },
    /// Save the curated ranking to the backend.
    Save,
    /// Show the save state.
    Status,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print all settings as JSON.
    Show,
    /// Change one setting, e.g. `settings set historyDays 60`.
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum RssAction {
    /// Show recommendations (when the new-tab page is enabled).
    Show,
    /// Show the backend RSS cache status.
    Status,
    /// Push RSS settings and refetch feeds.
    Update,
    /// Clear the backend RSS cache.
    Clear,
    /// Enable or disable the new-tab page.
    Newtab {
        #[arg(value_parser = parse_switch)]
        state: bool,
    },
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(format!("expected on or off, got '{}'", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "history_curator=info,history_curator_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        tracing::debug!(path = %cli.config.display(), "config file not found, using defaults");
        Config::minimal()
    };

    let sqlite = Arc::new(SqliteStateStore::open(&cfg).await?);
    let store: Arc<dyn StateStore> = sqlite.clone();
    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(&cfg.backend)?);

    match cli.command {
        Commands::Init => {
            let written = settings::install_defaults(store.as_ref()).await?;
            println!("Database initialized successfully.");
            if !written.is_empty() {
                println!("Installed defaults: {}", written.join(", "));
            }
        }
        Commands::Harvest { days, progress } => {
            let progress = progress_mode(progress.as_deref())?;
            let days = match days {
                Some(d) => d,
                None => Settings::load(store.as_ref()).await?.history_days,
            };
            let harvester = build_harvester(&cfg, store.clone()).await?;
            let cancel = cancel_on_ctrl_c();
            let records = harvester
                .fetch_history_with(days, &cancel, progress.reporter().as_ref())
                .await?;
            println!("Harvested {} records covering {} days.", records.len(), days);
        }
        Commands::Export { progress } => {
            let progress = progress_mode(progress.as_deref())?;
            let harvester = build_harvester(&cfg, store.clone()).await?;
            let cancel = cancel_on_ctrl_c();
            let report = export::export_history(
                &cfg.export.dir,
                &harvester,
                store.as_ref(),
                backend.as_ref(),
                &cancel,
                progress.reporter().as_ref(),
            )
            .await?;
            println!(
                "Exported {} records to {}",
                report.total_count,
                report.path.display()
            );
        }
        Commands::Analyze => {
            let ack = analysis::run_analysis(store.as_ref(), backend.as_ref()).await?;
            if !ack.ok {
                bail!("Analysis failed: {}", ack.err.unwrap_or_default());
            }
            let curator = Curator::new(store.clone(), backend.clone());
            curator.open().await?;
            println!("Analysis complete: {} tags.", curator.active().len());
        }
        Commands::Ping => {
            if backend.ping().await {
                println!("Backend reachable at {}", cfg.backend.url);
            } else {
                bail!("Backend not responding at {}", cfg.backend.url);
            }
        }
        Commands::Tags { action } => run_tags(action, store, backend).await?,
        Commands::Settings { action } => match action {
            SettingsAction::Show => {
                let settings = Settings::load(store.as_ref()).await?;
                println!("{}", serde_json::to_string_pretty(&settings)?);
            }
            SettingsAction::Set { key, value } => {
                let mut settings = Settings::load(store.as_ref()).await?;
                settings.apply(&key, &value)?;
                if key == "newtabEnabled" {
                    rss::set_newtab_enabled(
                        store.as_ref(),
                        backend.as_ref(),
                        settings.newtab_enabled,
                    )
                    .await?;
                }
                settings.save(store.as_ref()).await?;
                if key.starts_with("rss") || key == "newtabEnabled" {
                    rss::push_settings(store.as_ref(), backend.as_ref()).await?;
                }
                println!("{}", serde_json::to_string_pretty(&settings)?);
            }
        },
        Commands::Rss { action } => run_rss(action, store, backend).await?,
    }

    sqlite.close().await;
    Ok(())
}

async fn run_tags(
    action: TagsAction,
    store: Arc<dyn StateStore>,
    backend: Arc<dyn Backend>,
) -> Result<()> {
    let curator = Curator::new(store, backend);
    match action {
        TagsAction::Refresh => {
            let source = curator.refresh().await?;
            println!("Loaded {} tags ({:?}).", curator.active().len(), source);
            return Ok(());
        }
        _ => {
            curator.resume().await?;
        }
    }

    match action {
        TagsAction::Refresh => {}
        TagsAction::List { deleted } => {
            print_tags(&curator, deleted);
        }
        TagsAction::Delete { tag } => {
            let id = resolve(&curator, &tag)?;
            if curator.delete_tag(&id).await? {
                println!("Deleted {}", tag);
            } else {
                println!("{} is not an active tag", tag);
            }
        }
        TagsAction::Restore { tag } => {
            let id = resolve(&curator, &tag)?;
            if curator.restore_tag(&id).await? {
                println!("Restored {}", tag);
            } else {
                println!("{} is not a deleted tag", tag);
            }
        }
        TagsAction::Add { label } => match curator.add_custom_tag(&label).await? {
            Some(tag) => println!("Added {} ({}) with count {}", tag.path, tag.id, tag.count),
            None => println!("Empty label ignored."),
        },
        TagsAction::Rank { tag, count, ratio } => {
            let id = resolve(&curator, &tag)?;
            let applied = match (count, ratio) {
                (_, Some(ratio)) => {
                    if curator.begin_drag(&id) {
                        let applied = curator.drag_to_ratio(ratio);
                        curator.end_drag().await?;
                        applied
                    } else {
                        None
                    }
                }
                (Some(count), None) => curator.reorder_by_drag(&id, count).await?,
                (None, None) => bail!("Either a count or --ratio is required"),
            };
            match applied {
                Some(count) => println!("{} now has count {}", tag, count),
                None => println!("{} is not an active tag", tag),
            }
        }
        TagsAction::Save => match curator.save().await? {
            Some(ack) if ack.ok => println!("Changes saved successfully."),
            Some(ack) => bail!("Save failed: {}", ack.err.unwrap_or_default()),
            None => println!("Nothing to save ({}).", curator.state().label()),
        },
        TagsAction::Status => println!("{}", curator.state().label()),
    }
    Ok(())
}

fn resolve(curator: &Curator, tag: &str) -> Result<String> {
    match curator.resolve(tag) {
        Some(id) => Ok(id),
        None => bail!("No tag with id or label '{}'", tag),
    }
}

fn print_tags(curator: &Curator, with_deleted: bool) {
    let rows = curator.ranked();
    if rows.is_empty() {
        println!("No active labels.");
    } else {
        println!("Your top {} labels [{}]", rows.len(), curator.state().label());
        for row in rows {
            let bar = "#".repeat((row.ratio * 20.0).round() as usize);
            println!(
                "{:>3}. {:<32} {:>6}  {:<20}  {}",
                row.rank, row.path, row.count, bar, row.id
            );
        }
    }

    if with_deleted {
        let deleted = curator.deleted();
        if !deleted.is_empty() {
            println!();
            println!("Deleted:");
            for tag in deleted {
                println!("     {:<32} {:>6}  {}", tag.path, tag.count, tag.id);
            }
        }
    }
}

async fn run_rss(
    action: RssAction,
    store: Arc<dyn StateStore>,
    backend: Arc<dyn Backend>,
) -> Result<()> {
    match action {
        RssAction::Show => match rss::load_recommendations(store.as_ref(), backend.as_ref()).await? {
            Some(results) => {
                if let Some(updated) = &results.updated {
                    println!("Updated: {}", updated);
                }
                for rec in &results.recommendations {
                    println!("{}", rec.label);
                    for article in &rec.top_articles {
                        println!("  - {}  {}", article.title, article.link);
                    }
                }
            }
            None => println!("Recommendations hidden."),
        },
        RssAction::Status => match rss::rss_status(backend.as_ref()).await {
            Some(status) if status.exists => println!(
                "Articles: {}  Size: {} MB",
                status.total_articles, status.file_size_mb
            ),
            Some(_) => println!("Articles: 0  Size: 0 MB"),
            None => println!("Articles: --  Size: --"),
        },
        RssAction::Update => {
            let ack = rss::update_rss(store.as_ref(), backend.as_ref()).await?;
            if !ack.ok {
                bail!("RSS update failed: {}", ack.err.unwrap_or_default());
            }
            println!("RSS updated.");
        }
        RssAction::Clear => {
            let ack = rss::clear_rss_cache(backend.as_ref()).await;
            if !ack.ok {
                bail!("Clearing RSS cache failed: {}", ack.err.unwrap_or_default());
            }
            println!("RSS cache cleared.");
        }
        RssAction::Newtab { state } => {
            rss::set_newtab_enabled(store.as_ref(), backend.as_ref(), state).await?;
            rss::push_settings(store.as_ref(), backend.as_ref()).await?;
            println!("New-tab page {}.", if state { "enabled" } else { "disabled" });
        }
    }
    Ok(())
}

async fn build_harvester(cfg: &Config, store: Arc<dyn StateStore>) -> Result<Harvester> {
    let source = source_from_config(cfg).await?;
    Ok(Harvester::new(
        source,
        store,
        cfg.harvest.limits(),
        cfg.harvest.pause(),
    ))
}

fn progress_mode(flag: Option<&str>) -> Result<ProgressMode> {
    match flag {
        Some(value) => ProgressMode::parse(value),
        None => Ok(ProgressMode::default_for_tty()),
    }
}

/// Cancel the returned token on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling harvest");
            child.cancel();
        }
    });
    token
}
