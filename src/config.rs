//! Configuration parsing.
//!
//! History Curator reads a TOML file (default `./config/curator.toml`).
//! Every section except `[db]` is optional and falls back to the defaults
//! below.
//!
//! ```toml
//! [db]
//! path = "./data/curator.sqlite"
//!
//! [backend]
//! url = "http://127.0.0.1:11668"
//! notify_timeout_ms = 2000
//! request_timeout_secs = 0        # 0 = no client timeout
//!
//! [harvest]
//! window_days = 15
//! max_results_per_query = 1000
//! max_total = 5000
//! pause_ms = 200
//!
//! [history]
//! browser = "chromium"            # or "firefox"
//! path = "~/.config/google-chrome/Default/History"
//!
//! [export]
//! dir = "./browser_history"
//! ```

use anyhow::{Context, Result};
use history_curator_core::history::HarvestLimits;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,
    #[serde(default)]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            notify_timeout_ms: default_notify_timeout_ms(),
            request_timeout_secs: 0,
        }
    }
}

impl BackendConfig {
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    /// Client timeout for analysis and save calls; `None` when unset.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

fn default_backend_url() -> String {
    "http://127.0.0.1:11668".to_string()
}
fn default_notify_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestConfig {
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    #[serde(default = "default_max_results_per_query")]
    pub max_results_per_query: usize,
    #[serde(default = "default_max_total")]
    pub max_total: usize,
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            max_results_per_query: default_max_results_per_query(),
            max_total: default_max_total(),
            pause_ms: default_pause_ms(),
        }
    }
}

impl HarvestConfig {
    pub fn limits(&self) -> HarvestLimits {
        HarvestLimits {
            window_days: self.window_days,
            max_results_per_query: self.max_results_per_query,
            max_total: self.max_total,
        }
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

fn default_window_days() -> u32 {
    15
}
fn default_max_results_per_query() -> usize {
    1000
}
fn default_max_total() -> usize {
    5000
}
fn default_pause_ms() -> u64 {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_browser")]
    pub browser: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            browser: default_browser(),
            path: None,
        }
    }
}

fn default_browser() -> String {
    "chromium".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
        }
    }
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("./browser_history")
}

impl Config {
    /// Configuration used when no file is available.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/curator.sqlite"),
            },
            backend: BackendConfig::default(),
            harvest: HarvestConfig::default(),
            history: HistoryConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.harvest.window_days == 0 {
        anyhow::bail!("harvest.window_days must be > 0");
    }
    if config.harvest.max_results_per_query == 0 {
        anyhow::bail!("harvest.max_results_per_query must be > 0");
    }
    if config.harvest.max_total == 0 {
        anyhow::bail!("harvest.max_total must be > 0");
    }

    let url = config.backend.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        anyhow::bail!("backend.url must start with http:// or https://, got '{}'", url);
    }

    match config.history.browser.as_str() {
        "chromium" | "firefox" => {}
        other => anyhow::bail!(
            "Unknown history browser: '{}'. Must be chromium or firefox.",
            other
        ),
    }

    Ok(())
}
