//! Backend gateway.
//!
//! Typed client for the local analysis service. The [`Backend`] trait is the
//! seam the curator, the analysis runner, and the RSS commands depend on;
//! [`HttpBackend`] is the `reqwest` implementation.
//!
//! Calls fall into three groups:
//!
//! | Group | Calls | Failure surface |
//! |-------|-------|-----------------|
//! | Best-effort | `notify_download`, `save_rss_settings`, `stop_auto_update` | logged, swallowed |
//! | User-facing | `save_custom_analysis`, `update_rss`, `clear_rss_cache` | [`Ack`] |
//! | Data | `ping`, `analyze`, `rss_results`, `rss_status` | `Result` / `bool` |
//!
//! Notifications carry a hard timeout (2 s by default). Analysis and save
//! calls have no client timeout unless `request_timeout_secs` is set, since
//! a full analysis can take minutes.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use history_curator_core::models::{AnalysisSnapshot, SummaryEntry};

use crate::config::BackendConfig;

/// Analysis parameters sent with `/analyze` and `/notify_download`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSettings {
    pub history_days: u32,
    pub granularity_level: u8,
    pub sampling_count: u32,
    pub site_blacklist: Vec<String>,
    pub use_deep_parsing: bool,
}

/// Body of `/save_custom_analysis`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomAnalysisPayload {
    pub total_count: u64,
    pub total_analyzed: u64,
    pub settings: serde_json::Value,
    pub summary: Vec<SummaryEntry>,
}

/// Body of `/save_rss_settings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RssSettingsPayload {
    pub enabled: bool,
    pub feeds: Vec<String>,
    pub history_days: u32,
    pub recommend_count: u32,
    pub auto_update: bool,
    pub update_interval_hours: u32,
}

/// Outcome of a user-facing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self { ok: true, err: None }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            err: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RssArticle {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Recommendations for one interest label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RssRecommendation {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub top_articles: Vec<RssArticle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RssResults {
    #[serde(default)]
    pub updated: Option<String>,
    pub recommendations: Vec<RssRecommendation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RssStatus {
    #[serde(default)]
    pub exists: bool,
    #[serde(default)]
    pub total_articles: u64,
    #[serde(default)]
    pub file_size_mb: f64,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// `{status, message}` reply of the RSS control endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
struct StatusReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// The analysis service as seen by the rest of the crate.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Whether the service answers at all.
    async fn ping(&self) -> bool;

    /// Tell the service a new export file is ready. Best-effort.
    async fn notify_download(&self, filename: &str, settings: &AnalysisSettings);

    async fn analyze(&self, settings: &AnalysisSettings) -> Result<AnalysisSnapshot>;

    async fn save_custom_analysis(&self, payload: &CustomAnalysisPayload) -> Ack;

    async fn rss_results(&self) -> Result<RssResults>;

    async fn rss_status(&self) -> Result<RssStatus>;

    /// Push RSS settings. Best-effort.
    async fn save_rss_settings(&self, payload: &RssSettingsPayload);

    async fn update_rss(&self) -> Ack;

    async fn clear_rss_cache(&self) -> Ack;

    /// Ask the service to stop its RSS refresh timer. Best-effort.
    async fn stop_auto_update(&self);
}

/// `reqwest` client for the analysis service.
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
    notify_timeout: Duration,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
            notify_timeout: config.notify_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.client.get(self.url(path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("{} returned HTTP {}: {}", path, status.as_u16(), body);
        }
        response
            .json()
            .await
            .with_context(|| format!("Invalid JSON from {}", path))
    }

    /// POST an empty object and interpret the `{status: "ok"}` reply.
    async fn post_control(&self, path: &str) -> Ack {
        let response = match self
            .client
            .post(self.url(path))
            .json(&serde_json::json!({}))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Ack::err(e.to_string()),
        };
        let status = response.status();
        let reply: StatusReply = response.json().await.unwrap_or_default();
        if status.is_success() && reply.status.as_deref() == Some("ok") {
            Ack::ok()
        } else {
            Ack::err(
                reply
                    .message
                    .or(reply.status)
                    .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
            )
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn ping(&self) -> bool {
        match self.client.get(self.url("/ping")).send().await {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "backend ping failed");
                false
            }
        }
    }

    async fn notify_download(&self, filename: &str, settings: &AnalysisSettings) {
        let body = serde_json::json!({
            "filename": filename,
            "settings": settings,
        });
        let result = self
            .client
            .post(self.url("/notify_download"))
            .timeout(self.notify_timeout)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match result {
            Ok(_) => tracing::info!(filename, "backend notified of export"),
            Err(e) => tracing::warn!(error = %e, filename, "export notification failed"),
        }
    }

    async fn analyze(&self, settings: &AnalysisSettings) -> Result<AnalysisSnapshot> {
        let response = self
            .client
            .post(self.url("/analyze"))
            .json(&serde_json::json!({ "settings": settings }))
            .send()
            .await
            .context("Analysis request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("HTTP {}: {}", status.as_u16(), body);
        }
        response
            .json()
            .await
            .context("Analysis response is not valid JSON")
    }

    async fn save_custom_analysis(&self, payload: &CustomAnalysisPayload) -> Ack {
        let response = match self
            .client
            .post(self.url("/save_custom_analysis"))
            .json(payload)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Ack::err(e.to_string()),
        };
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ack::err(format!("HTTP {}: {}", status.as_u16(), body));
        }
        match response.json::<serde_json::Value>().await {
            Ok(_) => Ack::ok(),
            Err(e) => Ack::err(format!("Invalid save response: {}", e)),
        }
    }

    async fn rss_results(&self) -> Result<RssResults> {
        let raw: serde_json::Value = self.get_json("/rss_results").await?;
        if raw.get("recommendations").is_none() {
            bail!("rss_results response has no recommendations");
        }
        serde_json::from_value(raw).context("Malformed rss_results response")
    }

    async fn rss_status(&self) -> Result<RssStatus> {
        self.get_json("/rss_status").await
    }

    async fn save_rss_settings(&self, payload: &RssSettingsPayload) {
        let result = self
            .client
            .post(self.url("/save_rss_settings"))
            .json(payload)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to push RSS settings");
        }
    }

    async fn update_rss(&self) -> Ack {
        self.post_control("/update_rss").await
    }

    async fn clear_rss_cache(&self) -> Ack {
        self.post_control("/clear_rss_cache").await
    }

    async fn stop_auto_update(&self) {
        let ack = self.post_control("/stop_auto_update").await;
        if !ack.ok {
            tracing::warn!(error = ?ack.err, "failed to stop RSS auto-update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_trimmed() {
        let config = BackendConfig {
            url: "http://127.0.0.1:11668/".to_string(),
            ..Default::default()
        };
        let backend = HttpBackend::new(&config).unwrap();
        assert_eq!(backend.url("/ping"), "http://127.0.0.1:11668/ping");
    }

    #[test]
    fn settings_serialize_camel_case() {
        let settings = AnalysisSettings {
            history_days: 30,
            granularity_level: 2,
            sampling_count: 50,
            site_blacklist: vec![],
            use_deep_parsing: true,
        };
        let value = serde_json::to_value(&settings).unwrap();
        assert_eq!(value["historyDays"], 30);
        assert_eq!(value["useDeepParsing"], true);
    }

    #[test]
    fn ack_omits_missing_error() {
        assert_eq!(serde_json::to_string(&Ack::ok()).unwrap(), r#"{"ok":true}"#);
    }
}
