//! In-process store used by tests and local runs.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::{ContentCatalog, CredentialStore, RevenueStore};
use crate::error::StoreError;
use crate::model::{
    AttributionRecord, ContentItem, CredentialPatch, Platform, PlatformCredential, RevenueEvent,
};

#[derive(Default)]
struct Inner {
    credentials: HashMap<(String, Platform), PlatformCredential>,
    // BTreeMap keeps scans in a stable (platform, order_id) order.
    events: BTreeMap<(Platform, String), RevenueEvent>,
    attributions: Vec<AttributionRecord>,
    content: Vec<ContentItem>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the content catalog (the real catalog lives outside this system).
    pub fn insert_content(&self, item: ContentItem) {
        let mut g = self.inner.write();
        g.content.retain(|c| c.id != item.id);
        g.content.push(item);
    }

    pub fn revenue_event_count(&self) -> usize {
        self.inner.read().events.len()
    }

    pub fn all_revenue_events(&self) -> Vec<RevenueEvent> {
        self.inner.read().events.values().cloned().collect()
    }

    pub fn all_attributions(&self) -> Vec<AttributionRecord> {
        self.inner.read().attributions.clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn fetch_credential(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<PlatformCredential>, StoreError> {
        Ok(self
            .inner
            .read()
            .credentials
            .get(&(user_id.to_string(), platform))
            .cloned())
    }

    async fn upsert_credential(&self, credential: &PlatformCredential) -> Result<(), StoreError> {
        self.inner.write().credentials.insert(
            (credential.user_id.clone(), credential.platform),
            credential.clone(),
        );
        Ok(())
    }

    async fn update_credential(
        &self,
        user_id: &str,
        platform: Platform,
        patch: &CredentialPatch,
    ) -> Result<bool, StoreError> {
        let mut g = self.inner.write();
        let Some(row) = g.credentials.get_mut(&(user_id.to_string(), platform)) else {
            return Ok(false);
        };
        if let Some(status) = patch.status {
            row.status = status;
        }
        if let Some(err) = &patch.last_error {
            row.last_error = err.clone();
        }
        if let Some(ts) = patch.last_sync_at {
            row.last_sync_at = Some(ts);
        }
        Ok(true)
    }
}

#[async_trait]
impl RevenueStore for MemoryStore {
    async fn upsert_revenue_event(&self, event: &RevenueEvent) -> Result<Uuid, StoreError> {
        let mut g = self.inner.write();
        let key = (event.platform, event.order_id.clone());
        match g.events.get_mut(&key) {
            Some(existing) => {
                let id = existing.id;
                let attributed = existing.attributed_content_id.take();
                *existing = event.clone();
                existing.id = id;
                existing.attributed_content_id = attributed;
                Ok(id)
            }
            None => {
                g.events.insert(key, event.clone());
                Ok(event.id)
            }
        }
    }

    async fn revenue_event(
        &self,
        platform: Platform,
        order_id: &str,
    ) -> Result<Option<RevenueEvent>, StoreError> {
        Ok(self
            .inner
            .read()
            .events
            .get(&(platform, order_id.to_string()))
            .cloned())
    }

    async fn unattributed_events(&self, user_id: &str) -> Result<Vec<RevenueEvent>, StoreError> {
        Ok(self
            .inner
            .read()
            .events
            .values()
            .filter(|e| e.user_id == user_id && e.attributed_content_id.is_none())
            .cloned()
            .collect())
    }

    async fn claim_attribution(
        &self,
        event_id: Uuid,
        content_id: &str,
    ) -> Result<bool, StoreError> {
        let mut g = self.inner.write();
        let Some(ev) = g.events.values_mut().find(|e| e.id == event_id) else {
            return Err(StoreError::NotFound(format!("revenue event {event_id}")));
        };
        if ev.attributed_content_id.is_some() {
            return Ok(false);
        }
        ev.attributed_content_id = Some(content_id.to_string());
        Ok(true)
    }

    async fn insert_attribution(&self, record: &AttributionRecord) -> Result<(), StoreError> {
        self.inner.write().attributions.push(record.clone());
        Ok(())
    }

    async fn release_attribution(
        &self,
        event_id: Uuid,
        content_id: &str,
    ) -> Result<bool, StoreError> {
        let mut g = self.inner.write();
        match g.events.values_mut().find(|e| e.id == event_id) {
            Some(ev) if ev.attributed_content_id.as_deref() == Some(content_id) => {
                ev.attributed_content_id = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit_attribution(&self, record: &AttributionRecord) -> Result<bool, StoreError> {
        let mut g = self.inner.write();
        let event_id = record.revenue_event_id;
        let Some(ev) = g.events.values_mut().find(|e| e.id == event_id) else {
            return Err(StoreError::NotFound(format!("revenue event {event_id}")));
        };
        if ev.attributed_content_id.is_some() {
            return Ok(false);
        }
        ev.attributed_content_id = Some(record.content_id.clone());
        g.attributions.push(record.clone());
        Ok(true)
    }

    async fn attributions_for_event(
        &self,
        event_id: Uuid,
    ) -> Result<Vec<AttributionRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .attributions
            .iter()
            .filter(|r| r.revenue_event_id == event_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ContentCatalog for MemoryStore {
    async fn content_for_user(&self, user_id: &str) -> Result<Vec<ContentItem>, StoreError> {
        Ok(self
            .inner
            .read()
            .content
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(order_id: &str, amount: f64) -> RevenueEvent {
        RevenueEvent {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            platform: Platform::ShopMy,
            order_id: order_id.into(),
            product_name: Some("Lamp".into()),
            product_category: None,
            quantity: 1,
            order_amount: amount,
            commission_amount: amount / 10.0,
            commission_rate: Some(0.1),
            order_date: None,
            tracking_id: None,
            click_date: None,
            raw_payload: json!({}),
            attributed_content_id: None,
        }
    }

    #[tokio::test]
    async fn upsert_keeps_id_and_attribution() {
        let store = MemoryStore::new();
        let first = event("A-1", 10.0);
        let id = store.upsert_revenue_event(&first).await.unwrap();
        assert!(store.claim_attribution(id, "post-9").await.unwrap());

        let second = event("A-1", 25.0);
        let id2 = store.upsert_revenue_event(&second).await.unwrap();
        assert_eq!(id, id2);

        let stored = store
            .revenue_event(Platform::ShopMy, "A-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.order_amount, 25.0);
        assert_eq!(stored.attributed_content_id.as_deref(), Some("post-9"));
        assert_eq!(store.revenue_event_count(), 1);
    }

    #[tokio::test]
    async fn claim_is_first_writer_wins() {
        let store = MemoryStore::new();
        let id = store.upsert_revenue_event(&event("A-2", 1.0)).await.unwrap();
        assert!(store.claim_attribution(id, "p1").await.unwrap());
        assert!(!store.claim_attribution(id, "p2").await.unwrap());
        assert!(store.unattributed_events("u1").await.unwrap().is_empty());
    }
}
