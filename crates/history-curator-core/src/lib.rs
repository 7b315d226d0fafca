//! # History Curator Core
//!
//! Runtime-agnostic logic for History Curator: data models, history
//! normalization and harvest planning, the tag reconciler, the save-state
//! tracker, and the state store trait.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O.

pub mod history;
pub mod models;
pub mod store;
pub mod sync_state;
pub mod tags;
