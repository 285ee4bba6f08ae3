// src/attribution/mod.rs
//! Links unattributed revenue events to the content most likely to have driven them.

pub mod scoring;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AttributionConfig;
use crate::error::StoreError;
use crate::ingest::anon_hash;
use crate::model::{AttributionRecord, ContentItem, RevenueEvent};
use crate::store::{ContentCatalog, RevenueStore};

pub use scoring::{score, ScoreBreakdown};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "attribution_events_scanned_total",
            "Unattributed revenue events scored."
        );
        describe_counter!(
            "attribution_matches_total",
            "Revenue events credited to a content item."
        );
    });
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AttributionOutcome {
    Matched { content_id: String, confidence: f64 },
    NoMatch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttributionSummary {
    pub events_scanned: usize,
    pub attributed: usize,
    pub unmatched: usize,
    /// Matches that could not be committed (store error or lost the claim).
    pub failed: usize,
}

/// Highest-scoring content for `event`. Ties keep the earliest item in `content`.
pub fn best_match(
    event: &RevenueEvent,
    content: &[ContentItem],
    cfg: &AttributionConfig,
) -> AttributionOutcome {
    let mut best: Option<(&ContentItem, f64)> = None;
    for item in content {
        let s = score(event, item, cfg.require_sale_after_post).total;
        if best.map_or(true, |(_, b)| s > b) {
            best = Some((item, s));
        }
    }
    match best {
        Some((item, s)) if s > 0.0 && s >= cfg.threshold => AttributionOutcome::Matched {
            content_id: item.id.clone(),
            confidence: s,
        },
        _ => AttributionOutcome::NoMatch,
    }
}

pub struct AttributionEngine {
    revenue: Arc<dyn RevenueStore>,
    catalog: Arc<dyn ContentCatalog>,
    cfg: AttributionConfig,
}

impl AttributionEngine {
    pub fn new(
        revenue: Arc<dyn RevenueStore>,
        catalog: Arc<dyn ContentCatalog>,
        cfg: AttributionConfig,
    ) -> Self {
        Self {
            revenue,
            catalog,
            cfg,
        }
    }

    /// Score every unattributed event of `user_id` and commit matches.
    ///
    /// Already-attributed events are never rescanned, so repeated runs only add links.
    pub async fn attribute(&self, user_id: &str) -> Result<AttributionSummary, StoreError> {
        ensure_metrics_described();
        let user = anon_hash(user_id);

        let events = self.revenue.unattributed_events(user_id).await?;
        let mut content = self.catalog.content_for_user(user_id).await?;
        content.sort_by(|a, b| a.id.cmp(&b.id));

        let mut summary = AttributionSummary {
            events_scanned: events.len(),
            ..Default::default()
        };
        counter!("attribution_events_scanned_total").increment(events.len() as u64);

        for event in &events {
            match best_match(event, &content, &self.cfg) {
                AttributionOutcome::NoMatch => summary.unmatched += 1,
                AttributionOutcome::Matched {
                    content_id,
                    confidence,
                } => match self.commit(event, &content_id, confidence).await {
                    Ok(true) => summary.attributed += 1,
                    Ok(false) => {
                        debug!(event = %event.id, "event attributed concurrently; skipping");
                        summary.failed += 1;
                    }
                    Err(e) => {
                        warn!(event = %event.id, error = %e, "attribution commit failed");
                        summary.failed += 1;
                    }
                },
            }
        }

        counter!("attribution_matches_total").increment(summary.attributed as u64);
        info!(
            user = %user,
            scanned = summary.events_scanned,
            attributed = summary.attributed,
            unmatched = summary.unmatched,
            failed = summary.failed,
            "attribution pass complete"
        );
        Ok(summary)
    }

    /// Claim the event and append its record. A lost claim writes nothing.
    async fn commit(
        &self,
        event: &RevenueEvent,
        content_id: &str,
        confidence: f64,
    ) -> Result<bool, StoreError> {
        self.revenue
            .commit_attribution(&AttributionRecord::fuzzy(content_id, event.id, confidence))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Platform;
    use chrono::{NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    fn event(product: &str, tracking: Option<&str>) -> RevenueEvent {
        RevenueEvent {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            platform: Platform::ShopMy,
            order_id: "O-1".into(),
            product_name: Some(product.into()),
            product_category: None,
            quantity: 1,
            order_amount: 40.0,
            commission_amount: 4.0,
            commission_rate: None,
            order_date: NaiveDate::from_ymd_opt(2024, 3, 5),
            tracking_id: tracking.map(str::to_string),
            click_date: None,
            raw_payload: serde_json::Value::Null,
            attributed_content_id: None,
        }
    }

    fn post(id: &str, caption: &str, url: Option<&str>) -> ContentItem {
        ContentItem {
            id: id.into(),
            user_id: "u1".into(),
            url: url.map(str::to_string),
            caption: Some(caption.into()),
            hashtags: vec![],
            posted_at: Some(Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap()),
        }
    }

    #[test]
    fn ties_go_to_the_first_item() {
        let cfg = AttributionConfig::default();
        let ev = event("Linen Duvet", None);
        let content = vec![
            post("a", "linen duvet haul", None),
            post("b", "linen duvet haul", None),
        ];
        let AttributionOutcome::Matched {
            content_id,
            confidence,
        } = best_match(&ev, &content, &cfg)
        else {
            panic!("expected a match");
        };
        assert_eq!(content_id, "a");
        assert!((confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn below_threshold_is_no_match() {
        let cfg = AttributionConfig::default();
        let ev = event("Ceramic Mug", None);
        let content = vec![post("a", "spring outfits", None)];
        assert_eq!(best_match(&ev, &content, &cfg), AttributionOutcome::NoMatch);
        assert_eq!(best_match(&ev, &[], &cfg), AttributionOutcome::NoMatch);
    }
}
