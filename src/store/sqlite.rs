// src/store/sqlite.rs
//! SQLite-backed store. Table layout mirrors the relational schema the connectors and the
//! attribution engine write to: uuids, timestamps (RFC 3339) and dates (`YYYY-MM-DD`) are TEXT,
//! raw payloads and hashtag lists are JSON text.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::{ContentCatalog, CredentialStore, RevenueStore};
use crate::error::StoreError;
use crate::model::{
    AttributionRecord, ContentItem, CredentialPatch, CredentialStatus, Platform,
    PlatformCredential, RevenueEvent,
};

const DATE_FMT: &str = "%Y-%m-%d";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and its tables.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let newly_created = !db_path.exists();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| {
                        StoreError::Backend(format!("creating {}: {e}", parent.display()))
                    })?;
            }
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5000));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(opts)
            .await?;

        if newly_created {
            info!("Initialized new database: {}", db_path.display());
        } else {
            info!("Opened existing database: {}", db_path.display());
        }

        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    /// Private in-memory database. One connection, so every query sees the same data.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    async fn create_tables(&self) -> Result<(), StoreError> {
        create_credentials_table(&self.pool).await?;
        create_revenue_events_table(&self.pool).await?;
        create_content_items_table(&self.pool).await?;
        create_attribution_table(&self.pool).await?;
        Ok(())
    }

    /// Seed or replace a content item (the catalog is owned by another system).
    pub async fn insert_content(&self, item: &ContentItem) -> Result<(), StoreError> {
        let hashtags = serde_json::to_string(&item.hashtags).map_err(|e| StoreError::Corrupt {
            field: "hashtags",
            reason: e.to_string(),
        })?;
        sqlx::query(
            r#"
            INSERT INTO content_items (id, user_id, url, caption, hashtags, posted_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                url = excluded.url,
                caption = excluded.caption,
                hashtags = excluded.hashtags,
                posted_at = excluded.posted_at
            "#,
        )
        .bind(&item.id)
        .bind(&item.user_id)
        .bind(&item.url)
        .bind(&item.caption)
        .bind(hashtags)
        .bind(item.posted_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn create_credentials_table(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS platform_credentials (
            user_id TEXT NOT NULL,
            platform TEXT NOT NULL,
            encrypted_blob TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'expired', 'needs_2fa', 'invalid')),
            last_sync_at TEXT,
            last_error TEXT,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (user_id, platform)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_revenue_events_table(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS revenue_events (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            platform TEXT NOT NULL,
            order_id TEXT NOT NULL,
            product_name TEXT,
            product_category TEXT,
            quantity INTEGER NOT NULL DEFAULT 1,
            order_amount REAL NOT NULL DEFAULT 0,
            commission_amount REAL NOT NULL DEFAULT 0,
            commission_rate REAL,
            order_date TEXT,
            tracking_id TEXT,
            click_date TEXT,
            raw_payload TEXT NOT NULL DEFAULT '{}',
            attributed_content_id TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (platform, order_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_revenue_events_unattributed
         ON revenue_events(user_id) WHERE attributed_content_id IS NULL",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_content_items_table(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_items (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            url TEXT,
            caption TEXT,
            hashtags TEXT NOT NULL DEFAULT '[]',
            posted_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_attribution_table(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_revenue_attribution (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_id TEXT NOT NULL,
            revenue_event_id TEXT NOT NULL REFERENCES revenue_events(id) ON DELETE CASCADE,
            confidence REAL NOT NULL CHECK (confidence >= 0 AND confidence <= 1),
            method TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

fn corrupt(field: &'static str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        field,
        reason: e.to_string(),
    }
}

fn parse_uuid(field: &'static str, s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| corrupt(field, e))
}

fn parse_platform(s: &str) -> Result<Platform, StoreError> {
    s.parse().map_err(|e| corrupt("platform", e))
}

fn parse_ts(field: &'static str, s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    s.map(|v| {
        DateTime::parse_from_rfc3339(&v)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| corrupt(field, e))
    })
    .transpose()
}

fn parse_day(field: &'static str, s: Option<String>) -> Result<Option<NaiveDate>, StoreError> {
    s.map(|v| NaiveDate::parse_from_str(&v, DATE_FMT).map_err(|e| corrupt(field, e)))
        .transpose()
}

fn credential_from_row(row: &SqliteRow) -> Result<PlatformCredential, StoreError> {
    let platform: String = row.try_get("platform")?;
    let status: String = row.try_get("status")?;
    Ok(PlatformCredential {
        user_id: row.try_get("user_id")?,
        platform: parse_platform(&platform)?,
        encrypted_blob: row.try_get("encrypted_blob")?,
        status: status.parse::<CredentialStatus>().map_err(|e| corrupt("status", e))?,
        last_sync_at: parse_ts("last_sync_at", row.try_get("last_sync_at")?)?,
        last_error: row.try_get("last_error")?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<RevenueEvent, StoreError> {
    let id: String = row.try_get("id")?;
    let platform: String = row.try_get("platform")?;
    let raw: String = row.try_get("raw_payload")?;
    Ok(RevenueEvent {
        id: parse_uuid("id", &id)?,
        user_id: row.try_get("user_id")?,
        platform: parse_platform(&platform)?,
        order_id: row.try_get("order_id")?,
        product_name: row.try_get("product_name")?,
        product_category: row.try_get("product_category")?,
        quantity: row.try_get("quantity")?,
        order_amount: row.try_get("order_amount")?,
        commission_amount: row.try_get("commission_amount")?,
        commission_rate: row.try_get("commission_rate")?,
        order_date: parse_day("order_date", row.try_get("order_date")?)?,
        tracking_id: row.try_get("tracking_id")?,
        click_date: parse_day("click_date", row.try_get("click_date")?)?,
        raw_payload: serde_json::from_str(&raw).map_err(|e| corrupt("raw_payload", e))?,
        attributed_content_id: row.try_get("attributed_content_id")?,
    })
}

fn content_from_row(row: &SqliteRow) -> Result<ContentItem, StoreError> {
    let hashtags: String = row.try_get("hashtags")?;
    Ok(ContentItem {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        url: row.try_get("url")?,
        caption: row.try_get("caption")?,
        hashtags: serde_json::from_str(&hashtags).map_err(|e| corrupt("hashtags", e))?,
        posted_at: parse_ts("posted_at", row.try_get("posted_at")?)?,
    })
}

fn attribution_from_row(row: &SqliteRow) -> Result<AttributionRecord, StoreError> {
    let event_id: String = row.try_get("revenue_event_id")?;
    Ok(AttributionRecord {
        content_id: row.try_get("content_id")?,
        revenue_event_id: parse_uuid("revenue_event_id", &event_id)?,
        confidence: row.try_get("confidence")?,
        method: row.try_get("method")?,
    })
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn fetch_credential(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<PlatformCredential>, StoreError> {
        let row = sqlx::query(
            "SELECT user_id, platform, encrypted_blob, status, last_sync_at, last_error
             FROM platform_credentials WHERE user_id = ? AND platform = ?",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(credential_from_row).transpose()
    }

    async fn upsert_credential(&self, c: &PlatformCredential) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO platform_credentials
                (user_id, platform, encrypted_blob, status, last_sync_at, last_error)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, platform) DO UPDATE SET
                encrypted_blob = excluded.encrypted_blob,
                status = excluded.status,
                last_sync_at = excluded.last_sync_at,
                last_error = excluded.last_error,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&c.user_id)
        .bind(c.platform.as_str())
        .bind(&c.encrypted_blob)
        .bind(c.status.as_str())
        .bind(c.last_sync_at.map(|t| t.to_rfc3339()))
        .bind(&c.last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_credential(
        &self,
        user_id: &str,
        platform: Platform,
        patch: &CredentialPatch,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE platform_credentials SET
                status = COALESCE(?, status),
                last_error = CASE WHEN ? THEN ? ELSE last_error END,
                last_sync_at = COALESCE(?, last_sync_at),
                updated_at = CURRENT_TIMESTAMP
            WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.last_error.is_some())
        .bind(patch.last_error.clone().flatten())
        .bind(patch.last_sync_at.map(|t| t.to_rfc3339()))
        .bind(user_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RevenueStore for SqliteStore {
    async fn upsert_revenue_event(&self, e: &RevenueEvent) -> Result<Uuid, StoreError> {
        let raw = serde_json::to_string(&e.raw_payload).map_err(|err| corrupt("raw_payload", err))?;
        let row = sqlx::query(
            r#"
            INSERT INTO revenue_events (
                id, user_id, platform, order_id, product_name, product_category, quantity,
                order_amount, commission_amount, commission_rate, order_date, tracking_id,
                click_date, raw_payload
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(platform, order_id) DO UPDATE SET
                user_id = excluded.user_id,
                product_name = excluded.product_name,
                product_category = excluded.product_category,
                quantity = excluded.quantity,
                order_amount = excluded.order_amount,
                commission_amount = excluded.commission_amount,
                commission_rate = excluded.commission_rate,
                order_date = excluded.order_date,
                tracking_id = excluded.tracking_id,
                click_date = excluded.click_date,
                raw_payload = excluded.raw_payload,
                updated_at = CURRENT_TIMESTAMP
            RETURNING id
            "#,
        )
        .bind(e.id.to_string())
        .bind(&e.user_id)
        .bind(e.platform.as_str())
        .bind(&e.order_id)
        .bind(&e.product_name)
        .bind(&e.product_category)
        .bind(e.quantity)
        .bind(e.order_amount)
        .bind(e.commission_amount)
        .bind(e.commission_rate)
        .bind(e.order_date.map(|d| d.format(DATE_FMT).to_string()))
        .bind(&e.tracking_id)
        .bind(e.click_date.map(|d| d.format(DATE_FMT).to_string()))
        .bind(raw)
        .fetch_one(&self.pool)
        .await?;
        let id: String = row.try_get("id")?;
        parse_uuid("id", &id)
    }

    async fn revenue_event(
        &self,
        platform: Platform,
        order_id: &str,
    ) -> Result<Option<RevenueEvent>, StoreError> {
        let row = sqlx::query("SELECT * FROM revenue_events WHERE platform = ? AND order_id = ?")
            .bind(platform.as_str())
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    async fn unattributed_events(&self, user_id: &str) -> Result<Vec<RevenueEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM revenue_events
             WHERE user_id = ? AND attributed_content_id IS NULL
             ORDER BY platform, order_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    async fn claim_attribution(
        &self,
        event_id: Uuid,
        content_id: &str,
    ) -> Result<bool, StoreError> {
        let id = event_id.to_string();
        let result = sqlx::query(
            "UPDATE revenue_events
             SET attributed_content_id = ?, updated_at = CURRENT_TIMESTAMP
             WHERE id = ? AND attributed_content_id IS NULL",
        )
        .bind(content_id)
        .bind(&id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists = sqlx::query("SELECT 1 FROM revenue_events WHERE id = ?")
            .bind(&id)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(format!("revenue event {event_id}"))),
        }
    }

    async fn insert_attribution(&self, r: &AttributionRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO content_revenue_attribution
                (content_id, revenue_event_id, confidence, method)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&r.content_id)
        .bind(r.revenue_event_id.to_string())
        .bind(r.confidence.clamp(0.0, 1.0))
        .bind(&r.method)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release_attribution(
        &self,
        event_id: Uuid,
        content_id: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE revenue_events
             SET attributed_content_id = NULL, updated_at = CURRENT_TIMESTAMP
             WHERE id = ? AND attributed_content_id = ?",
        )
        .bind(event_id.to_string())
        .bind(content_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit_attribution(&self, r: &AttributionRecord) -> Result<bool, StoreError> {
        let id = r.revenue_event_id.to_string();
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE revenue_events
             SET attributed_content_id = ?, updated_at = CURRENT_TIMESTAMP
             WHERE id = ? AND attributed_content_id IS NULL",
        )
        .bind(&r.content_id)
        .bind(&id)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM revenue_events WHERE id = ?")
                .bind(&id)
                .fetch_optional(&mut *tx)
                .await?;
            tx.rollback().await?;
            return match exists {
                Some(_) => Ok(false),
                None => Err(StoreError::NotFound(format!("revenue event {id}"))),
            };
        }

        sqlx::query(
            "INSERT INTO content_revenue_attribution
                (content_id, revenue_event_id, confidence, method)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&r.content_id)
        .bind(&id)
        .bind(r.confidence.clamp(0.0, 1.0))
        .bind(&r.method)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn attributions_for_event(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<AttributionRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT content_id, revenue_event_id, confidence, method
             FROM content_revenue_attribution WHERE revenue_event_id = ? ORDER BY id",
        )
        .bind(event_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(attribution_from_row).collect()
    }
}

#[async_trait]
impl ContentCatalog for SqliteStore {
    async fn content_for_user(&self, user_id: &str) -> Result<Vec<ContentItem>, StoreError> {
        let rows = sqlx::query("SELECT * FROM content_items WHERE user_id = ? ORDER BY id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(content_from_row).collect()
    }
}
