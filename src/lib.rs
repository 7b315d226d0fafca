//! # History Curator
//!
//! Local browsing-history harvester and interest-tag curator.
//!
//! History Curator reads the user's browser history, hands it to a local
//! analysis service, and lets the user curate the topic tags that come
//! back: delete, restore, add, and re-rank them, then save the curated
//! ranking to the service. It can also surface the service's RSS
//! recommendations.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌───────────┐   ┌───────────────┐
//! │  Browser DB │──▶│ Harvester │──▶│ export JSON   │──┐
//! │ Chromium/FF │   └─────┬─────┘   └───────────────┘  │ notify
//! └─────────────┘         │ historyData                ▼
//!                   ┌─────▼─────┐    /analyze    ┌──────────┐
//!                   │  SQLite   │◀──────────────▶│ backend  │
//!                   │ key/value │ pythonAnalysis │ (HTTP)   │
//!                   └─────┬─────┘                └────▲─────┘
//!                         │ tagState                  │ save_custom_analysis
//!                   ┌─────▼─────┐                     │
//!                   │  Curator  │─────────────────────┘
//!                   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! curator init                      # create database, install defaults
//! curator export                    # harvest + write export + notify
//! curator analyze                   # run analysis, load tags
//! curator tags list
//! curator tags delete "News/Sports"
//! curator tags save
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite key/value state store |
//! | [`history_source`] | Chromium and Firefox history readers |
//! | [`harvest`] | Windowed, deduplicating history harvest |
//! | [`progress`] | Harvest progress reporting |
//! | [`gateway`] | HTTP client for the analysis backend |
//! | [`settings`] | Persisted user settings |
//! | [`curator`] | Tag curation session and save tracking |
//! | [`analysis`] | Analysis runner |
//! | [`export`] | History export file |
//! | [`rss`] | RSS recommendations |
//!
//! Pure logic (tag reconciliation, dirty tracking, history normalization)
//! lives in the `history-curator-core` crate.

pub mod analysis;
pub mod config;
pub mod curator;
pub mod db;
pub mod export;
pub mod gateway;
pub mod harvest;
pub mod history_source;
pub mod migrate;
pub mod progress;
pub mod rss;
pub mod settings;
pub mod sqlite_store;
