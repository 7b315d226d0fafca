//! User settings.
//!
//! Each setting is its own top-level document in the state store, keyed by
//! its camelCase name (`historyDays`, `siteBlacklist`, ...). A missing or
//! malformed key reads as its default. Writes go through [`Settings::save`],
//! which normalizes values first.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use history_curator_core::models::format_iso_millis;
use history_curator_core::store::{get_or, keys, StateStore};

use crate::gateway::{AnalysisSettings, RssSettingsPayload};

pub const DEFAULT_HISTORY_DAYS: u32 = 30;
pub const DEFAULT_GRANULARITY: u8 = 2;
pub const DEFAULT_SAMPLING_COUNT: u32 = 50;
pub const DEFAULT_RSS_DAYS: u32 = 14;
pub const DEFAULT_RSS_COUNT: u32 = 20;
pub const DEFAULT_RSS_AUTO_UPDATE_HOURS: u32 = 1;

/// Upper bound for `samplingCount` at a granularity level.
pub fn sampling_limit(granularity: u8) -> u32 {
    match granularity {
        1 => 20,
        2 => 50,
        _ => 100,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub history_days: u32,
    pub granularity_level: u8,
    pub sampling_count: u32,
    pub site_blacklist: Vec<String>,
    pub use_deep_parsing: bool,
    pub newtab_enabled: bool,
    pub rss_sources: Vec<String>,
    pub rss_days: u32,
    pub rss_count: u32,
    pub rss_auto_update_hours: u32,
    pub rss_auto_update_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            history_days: DEFAULT_HISTORY_DAYS,
            granularity_level: DEFAULT_GRANULARITY,
            sampling_count: DEFAULT_SAMPLING_COUNT,
            site_blacklist: Vec::new(),
            use_deep_parsing: true,
            newtab_enabled: false,
            rss_sources: Vec::new(),
            rss_days: DEFAULT_RSS_DAYS,
            rss_count: DEFAULT_RSS_COUNT,
            rss_auto_update_hours: DEFAULT_RSS_AUTO_UPDATE_HOURS,
            rss_auto_update_enabled: true,
        }
    }
}

impl Settings {
    /// Read every setting, defaulting the ones that are missing.
    pub async fn load(store: &dyn StateStore) -> Result<Self> {
        let d = Settings::default();
        Ok(Self {
            history_days: get_or(store, "historyDays", d.history_days).await?,
            granularity_level: get_or(store, "granularityLevel", d.granularity_level).await?,
            sampling_count: get_or(store, "samplingCount", d.sampling_count).await?,
            site_blacklist: get_or(store, "siteBlacklist", d.site_blacklist).await?,
            use_deep_parsing: get_or(store, "useDeepParsing", d.use_deep_parsing).await?,
            newtab_enabled: get_or(store, "newtabEnabled", d.newtab_enabled).await?,
            rss_sources: get_or(store, "rssSources", d.rss_sources).await?,
            rss_days: get_or(store, "rssDays", d.rss_days).await?,
            rss_count: get_or(store, "rssCount", d.rss_count).await?,
            rss_auto_update_hours: get_or(store, "rssAutoUpdateHours", d.rss_auto_update_hours)
                .await?,
            rss_auto_update_enabled: get_or(
                store,
                "rssAutoUpdateEnabled",
                d.rss_auto_update_enabled,
            )
            .await?,
        })
    }

    /// Normalize and write every setting.
    pub async fn save(&mut self, store: &dyn StateStore) -> Result<()> {
        self.normalize();
        store.set_many(self.entries()?).await
    }

    fn entries(&self) -> Result<Vec<(String, Value)>> {
        let Value::Object(map) = serde_json::to_value(self)? else {
            bail!("settings did not serialize to an object");
        };
        Ok(map.into_iter().collect())
    }

    /// Clamp `samplingCount` to the granularity limit and tidy the lists.
    pub fn normalize(&mut self) {
        let limit = sampling_limit(self.granularity_level);
        self.sampling_count = self.sampling_count.clamp(1, limit);
        self.history_days = self.history_days.max(1);
        self.site_blacklist = tidy_list(&self.site_blacklist);
        self.rss_sources = tidy_list(&self.rss_sources);
    }

    /// Apply one `key = value` edit from the command line.
    ///
    /// Lists accept comma- or newline-separated entries.
    pub fn apply(&mut self, key: &str, raw: &str) -> Result<()> {
        let raw = raw.trim();
        match key {
            "historyDays" => self.history_days = parse(key, raw)?,
            "granularityLevel" => {
                let level: u8 = parse(key, raw)?;
                if !(1..=3).contains(&level) {
                    bail!("granularityLevel must be 1, 2, or 3");
                }
                self.granularity_level = level;
            }
            "samplingCount" => self.sampling_count = parse(key, raw)?,
            "siteBlacklist" => self.site_blacklist = split_list(raw),
            "useDeepParsing" => self.use_deep_parsing = parse(key, raw)?,
            "newtabEnabled" => self.newtab_enabled = parse(key, raw)?,
            "rssSources" => self.rss_sources = split_list(raw),
            "rssDays" => self.rss_days = parse(key, raw)?,
            "rssCount" => self.rss_count = parse(key, raw)?,
            "rssAutoUpdateHours" => self.rss_auto_update_hours = parse(key, raw)?,
            "rssAutoUpdateEnabled" => self.rss_auto_update_enabled = parse(key, raw)?,
            other => bail!("Unknown setting: '{}'", other),
        }
        Ok(())
    }

    pub fn analysis_settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            history_days: self.history_days,
            granularity_level: self.granularity_level,
            sampling_count: self.sampling_count,
            site_blacklist: self.site_blacklist.clone(),
            use_deep_parsing: self.use_deep_parsing,
        }
    }
}

/// Build the `/save_rss_settings` body.
pub fn rss_settings_from(settings: &Settings) -> RssSettingsPayload {
    RssSettingsPayload {
        enabled: settings.newtab_enabled,
        feeds: settings.rss_sources.clone(),
        history_days: settings.rss_days,
        recommend_count: settings.rss_count,
        auto_update: settings.rss_auto_update_hours > 0,
        update_interval_hours: settings.rss_auto_update_hours,
    }
}

/// Write defaults for every setting not yet stored, and stamp `installedAt`
/// the first time. Returns the keys that were written.
pub async fn install_defaults(store: &dyn StateStore) -> Result<Vec<String>> {
    let existing = store.keys().await?;
    let defaults = Settings::default().entries()?;

    let mut missing: Vec<(String, Value)> = defaults
        .into_iter()
        .filter(|(k, _)| !existing.contains(k))
        .collect();
    if !existing.iter().any(|k| k == keys::INSTALLED_AT) {
        missing.push((
            keys::INSTALLED_AT.to_string(),
            json!(format_iso_millis(chrono::Utc::now())),
        ));
    }

    let written: Vec<String> = missing.iter().map(|(k, _)| k.clone()).collect();
    if !missing.is_empty() {
        store
            .set_many(missing)
            .await
            .context("Failed to write default settings")?;
        tracing::info!(keys = written.len(), "installed default settings");
    }
    Ok(written)
}

/// Install timestamp, when one was recorded.
pub async fn installed_at(store: &dyn StateStore) -> Result<Option<String>> {
    get_or(store, keys::INSTALLED_AT, None).await
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| anyhow::anyhow!("Invalid value for {}: '{}'", key, raw))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', '\n']).map(str::to_string).collect()
}

fn tidy_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
