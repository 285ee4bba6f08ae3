// src/store/mod.rs
//! Persistence seams. The relational store is an external collaborator; these traits
//! capture the operations the core needs: upsert on a conflict key, filtered select,
//! fetch-or-none and update.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{
    AttributionRecord, ContentItem, CredentialPatch, Platform, PlatformCredential, RevenueEvent,
};

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// `platform_credentials` table: one row per (user, platform).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn fetch_credential(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<PlatformCredential>, StoreError>;

    /// Insert or replace the row for (user, platform).
    async fn upsert_credential(&self, credential: &PlatformCredential) -> Result<(), StoreError>;

    /// Apply a patch to an existing row. Returns `false` when no row matched.
    async fn update_credential(
        &self,
        user_id: &str,
        platform: Platform,
        patch: &CredentialPatch,
    ) -> Result<bool, StoreError>;
}

/// `revenue_events` and `content_revenue_attribution` tables.
#[async_trait]
pub trait RevenueStore: Send + Sync {
    /// Upsert keyed by (platform, order_id). On conflict the stored id and
    /// `attributed_content_id` survive; every other field takes the new value.
    /// Returns the id of the stored row.
    async fn upsert_revenue_event(&self, event: &RevenueEvent) -> Result<Uuid, StoreError>;

    async fn revenue_event(
        &self,
        platform: Platform,
        order_id: &str,
    ) -> Result<Option<RevenueEvent>, StoreError>;

    /// All of a user's events with no attributed content.
    async fn unattributed_events(&self, user_id: &str) -> Result<Vec<RevenueEvent>, StoreError>;

    /// Set `attributed_content_id` only if it is still null. Returns whether the row was claimed.
    async fn claim_attribution(
        &self,
        event_id: Uuid,
        content_id: &str,
    ) -> Result<bool, StoreError>;

    async fn insert_attribution(&self, record: &AttributionRecord) -> Result<(), StoreError>;

    /// Undo a claim, but only while the event still points at `content_id`.
    async fn release_attribution(
        &self,
        event_id: Uuid,
        content_id: &str,
    ) -> Result<bool, StoreError>;

    /// Claim the event and write its record as one unit. `Ok(false)` means the event was
    /// already attributed and nothing was written.
    ///
    /// The default runs claim then insert and releases the claim when the insert fails.
    /// Stores with transactions override it.
    async fn commit_attribution(&self, record: &AttributionRecord) -> Result<bool, StoreError> {
        let event_id = record.revenue_event_id;
        if !self.claim_attribution(event_id, &record.content_id).await? {
            return Ok(false);
        }
        if let Err(e) = self.insert_attribution(record).await {
            if let Err(undo) = self.release_attribution(event_id, &record.content_id).await {
                tracing::error!(event = %event_id, error = %undo, "claim left without a record");
            }
            return Err(e);
        }
        Ok(true)
    }

    async fn attributions_for_event(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<AttributionRecord>, StoreError>;
}

/// Read side of the external content catalog.
#[async_trait]
pub trait ContentCatalog: Send + Sync {
    async fn content_for_user(&self, user_id: &str) -> Result<Vec<ContentItem>, StoreError>;
}
