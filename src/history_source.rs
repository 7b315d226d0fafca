//! Browser history sources.
//!
//! A [`HistorySource`] answers one question: which pages were last visited
//! inside a time window, newest first, up to a result cap. The harvester
//! drives it window by window.
//!
//! Two built-in sources read a browser profile database directly:
//!
//! | Browser | File | Table | Timestamp unit |
//! |---------|------|-------|----------------|
//! | Chromium | `History` | `urls` | µs since 1601-01-01 |
//! | Firefox | `places.sqlite` | `moz_places` | µs since 1970-01-01 |
//!
//! Browsers keep their database locked while running, so the file and its
//! `-wal` sidecar are copied to a temporary location and read from there.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};

use history_curator_core::models::RawVisit;

use crate::config::Config;

/// Microseconds between 1601-01-01 and 1970-01-01.
const WEBKIT_EPOCH_OFFSET_MICROS: i64 = 11_644_473_600 * 1_000_000;

/// A queryable store of past page visits.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Visits whose last visit falls in `[start, end)`, newest first, at
    /// most `max_results` of them.
    async fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<RawVisit>>;
}

/// Build the source named by `[history]` in the config.
pub async fn source_from_config(config: &Config) -> Result<Box<dyn HistorySource>> {
    let browser = config.history.browser.as_str();
    let path = match &config.history.path {
        Some(p) => p.clone(),
        None => match default_history_path(browser) {
            Some(p) => p,
            None => bail!(
                "No history database configured. Set [history] path for browser '{}'.",
                browser
            ),
        },
    };

    match browser {
        "chromium" => Ok(Box::new(ChromiumHistorySource::open(&path).await?)),
        "firefox" => Ok(Box::new(FirefoxHistorySource::open(&path).await?)),
        other => bail!("Unknown history browser: '{}'", other),
    }
}

/// Default Chromium profile location. Firefox profile directories carry a
/// random prefix, so there is no default for them.
fn default_history_path(browser: &str) -> Option<PathBuf> {
    if browser != "chromium" {
        return None;
    }
    if cfg!(target_os = "windows") {
        let base = std::env::var_os("LOCALAPPDATA")?;
        Some(PathBuf::from(base).join(r"Google\Chrome\User Data\Default\History"))
    } else if cfg!(target_os = "macos") {
        let home = std::env::var_os("HOME")?;
        Some(PathBuf::from(home).join("Library/Application Support/Google/Chrome/Default/History"))
    } else {
        let home = std::env::var_os("HOME")?;
        Some(PathBuf::from(home).join(".config/google-chrome/Default/History"))
    }
}

/// Temporary copy of a browser database, removed on drop.
///
/// Browsers run their databases in WAL mode, so recent visits may only be
/// in the `-wal` sidecar. It is copied alongside the main file when present.
struct TempCopy {
    path: PathBuf,
    has_wal: bool,
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

impl TempCopy {
    fn create(original: &Path) -> Result<Self> {
        if !original.exists() {
            bail!("History database not found: {}", original.display());
        }
        let path = std::env::temp_dir().join(format!(
            "curator-history-{}.sqlite",
            uuid::Uuid::new_v4().simple()
        ));
        let mut copy = Self {
            path,
            has_wal: false,
        };
        copy_file(original, &copy.path)?;

        let wal = sidecar(original, "-wal");
        if wal.exists() {
            copy_file(&wal, &sidecar(&copy.path, "-wal"))?;
            copy.has_wal = true;
        }
        Ok(copy)
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    std::fs::copy(from, to).with_context(|| {
        format!(
            "Failed to copy history database {} to {}",
            from.display(),
            to.display()
        )
    })?;
    Ok(())
}

impl Drop for TempCopy {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
        let _ = std::fs::remove_file(sidecar(&self.path, "-wal"));
        let _ = std::fs::remove_file(sidecar(&self.path, "-shm"));
    }
}

/// Read-only pool over a temporary copy of a browser database.
struct BrowserDb {
    pool: SqlitePool,
    _copy: TempCopy,
}

impl BrowserDb {
    async fn open(original: &Path) -> Result<Self> {
        let copy = TempCopy::create(original)?;
        // Replaying a copied WAL needs write access to the private copy.
        let options = SqliteConnectOptions::new()
            .filename(&copy.path)
            .read_only(!copy.has_wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open history database {}", original.display()))?;
        tracing::debug!(
            source = %original.display(),
            copy = %copy.path.display(),
            wal = copy.has_wal,
            "opened history copy"
        );
        Ok(Self { pool, _copy: copy })
    }

    async fn fetch(
        &self,
        sql: &str,
        start_micros: i64,
        end_micros: i64,
        max_results: usize,
        to_instant: fn(i64) -> Option<DateTime<Utc>>,
    ) -> Result<Vec<RawVisit>> {
        let limit = i64::try_from(max_results).unwrap_or(i64::MAX);
        let rows = sqlx::query(sql)
            .bind(start_micros)
            .bind(end_micros)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let mut visits = Vec::with_capacity(rows.len());
        for row in rows {
            let micros: i64 = row.get("visit_time");
            let Some(last_visit) = to_instant(micros) else {
                continue;
            };
            let id: i64 = row.get("id");
            visits.push(RawVisit {
                id: Some(id.to_string()),
                url: row.get("url"),
                title: row.get("title"),
                last_visit,
                visit_count: row.get("visit_count"),
            });
        }
        Ok(visits)
    }
}

/// Chromium-family `History` database.
pub struct ChromiumHistorySource {
    db: BrowserDb,
}

impl ChromiumHistorySource {
    pub async fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            db: BrowserDb::open(path).await?,
        })
    }
}

fn to_webkit_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros() + WEBKIT_EPOCH_OFFSET_MICROS
}

fn from_webkit_micros(micros: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_micros(micros - WEBKIT_EPOCH_OFFSET_MICROS).single()
}

#[async_trait]
impl HistorySource for ChromiumHistorySource {
    async fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<RawVisit>> {
        self.db
            .fetch(
                r#"
                SELECT id, url, title, visit_count, last_visit_time AS visit_time
                FROM urls
                WHERE hidden = 0 AND last_visit_time >= ? AND last_visit_time < ?
                ORDER BY last_visit_time DESC
                LIMIT ?
                "#,
                to_webkit_micros(start),
                to_webkit_micros(end),
                max_results,
                from_webkit_micros,
            )
            .await
    }
}

/// Firefox `places.sqlite` database.
pub struct FirefoxHistorySource {
    db: BrowserDb,
}

impl FirefoxHistorySource {
    pub async fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            db: BrowserDb::open(path).await?,
        })
    }
}

fn from_unix_micros(micros: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_micros(micros).single()
}

#[async_trait]
impl HistorySource for FirefoxHistorySource {
    async fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_results: usize,
    ) -> Result<Vec<RawVisit>> {
        self.db
            .fetch(
                r#"
                SELECT id, url, title, visit_count, last_visit_date AS visit_time
                FROM moz_places
                WHERE hidden = 0
                  AND last_visit_date IS NOT NULL
                  AND last_visit_date >= ? AND last_visit_date < ?
                ORDER BY last_visit_date DESC
                LIMIT ?
                "#,
                start.timestamp_micros(),
                end.timestamp_micros(),
                max_results,
                from_unix_micros,
            )
            .await
    }
}
