//! SQLite-backed [`StateStore`] implementation.
//!
//! Each key is one row of the `state` table holding the JSON-encoded
//! document. Writes replace the whole row.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, Sqlite, SqlitePool};

use history_curator_core::store::StateStore;

use crate::config::Config;
use crate::{db, migrate};

/// SQLite implementation of the [`StateStore`] trait.
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = sqlx::query_scalar("SELECT value FROM state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match raw {
            Some(text) => {
                let value = serde_json::from_str(&text)
                    .with_context(|| format!("corrupt JSON stored under '{}'", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        upsert(&self.pool, key, &value, chrono::Utc::now().timestamp()).await
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = chrono::Utc::now().timestamp();
        for (key, value) in &entries {
            upsert(&mut *tx, key, value, now).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM state WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM state ORDER BY key ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("key")).collect())
    }
}

async fn upsert<'e, E>(executor: E, key: &str, value: &Value, now: i64) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO state (key, value, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(serde_json::to_string(value)?)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(())
}
