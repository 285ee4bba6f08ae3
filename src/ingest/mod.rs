// src/ingest/mod.rs
pub mod browser;
pub mod export;
pub mod fields;
pub mod http;
pub mod normalize;
pub mod providers;
pub mod scrape;
pub mod types;
pub mod webdriver;

use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{FailureClass, StrategyError, SyncError};
use crate::ingest::fields::{map_row, IdSource, MappedRow, RowContext};
use crate::ingest::types::{AttemptContext, RetrievalStrategy, Retrieved, SyncReport, SyncWindow};
use crate::model::{CredentialStatus, Platform};
use crate::store::RevenueStore;
use crate::vault::CredentialVault;

/// One-time metrics registration (so series show up in the exposition).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_runs_total", "Connector runs started, per platform.");
        describe_counter!(
            "sync_rows_upserted_total",
            "Revenue rows written by connector runs."
        );
        describe_counter!(
            "sync_rows_skipped_total",
            "Malformed rows skipped during ingestion."
        );
        describe_counter!(
            "sync_rows_dropped_total",
            "Rows dropped for lacking an order id."
        );
        describe_counter!(
            "sync_synthetic_ids_total",
            "Rows stored under a minted order id."
        );
        describe_counter!(
            "sync_auth_failures_total",
            "Runs stopped because the platform rejected the session."
        );
        describe_counter!(
            "sync_strategy_failures_total",
            "Transient retrieval strategy failures."
        );
        describe_histogram!("sync_strategy_ms", "Strategy attempt time in milliseconds.");
        describe_gauge!(
            "sync_last_success_ts",
            "Unix ts of the last successful run, per platform."
        );
    });
}

/// Short stable digest for logging user ids without exposing them.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub const DEFAULT_WINDOW_DAYS: u32 = 30;
pub const DEFAULT_STRATEGY_TIMEOUT: Duration = Duration::from_secs(180);

/// Per-platform connector: an ordered strategy chain over shared vault and store.
///
/// Only `active` credentials are synced; any other status waits for a relink.
/// Strategies run strictly in order; the first `Ok` wins even with zero rows. An auth-class
/// failure marks the credential expired and ends the run. Transient failures fall through
/// and leave the credential untouched.
pub struct Connector {
    platform: Platform,
    vault: CredentialVault,
    store: Arc<dyn RevenueStore>,
    strategies: Vec<Box<dyn RetrievalStrategy>>,
    window_days: u32,
    strategy_timeout: Duration,
}

impl Connector {
    pub fn new(platform: Platform, vault: CredentialVault, store: Arc<dyn RevenueStore>) -> Self {
        Self {
            platform,
            vault,
            store,
            strategies: Vec::new(),
            window_days: DEFAULT_WINDOW_DAYS,
            strategy_timeout: DEFAULT_STRATEGY_TIMEOUT,
        }
    }

    pub fn with_strategy<S: RetrievalStrategy + 'static>(mut self, strategy: S) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn with_boxed_strategy(mut self, strategy: Box<dyn RetrievalStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_window_days(mut self, days: u32) -> Self {
        self.window_days = days;
        self
    }

    /// Upper bound on a single attempt, including browser teardown.
    pub fn with_strategy_timeout(mut self, timeout: Duration) -> Self {
        self.strategy_timeout = timeout;
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Sync the trailing window (default 30 days) for one user.
    pub async fn scrape_user(&self, user_id: &str) -> SyncReport {
        self.scrape_user_window(user_id, SyncWindow::trailing_days(self.window_days))
            .await
    }

    pub async fn scrape_user_window(&self, user_id: &str, window: SyncWindow) -> SyncReport {
        ensure_metrics_described();
        let platform = self.platform;
        let user = anon_hash(user_id);
        counter!("sync_runs_total", "platform" => platform.as_str()).increment(1);

        let entry = match self.vault.entry(user_id, platform).await {
            Ok(Some(e)) => e,
            Ok(None) => {
                info!(%platform, user = %user, "no stored credentials; skipping");
                return SyncReport::failed(platform, SyncError::CredentialMissing);
            }
            Err(e) => {
                error!(%platform, user = %user, error = %e, "credential read failed");
                return SyncReport::failed(platform, e.into());
            }
        };

        if entry.status != CredentialStatus::Active {
            info!(
                %platform,
                user = %user,
                status = %entry.status,
                "credential not active; skipping"
            );
            return SyncReport::failed(platform, SyncError::CredentialInactive(entry.status));
        }

        let ctx = AttemptContext {
            user_id,
            platform,
            credentials: &entry.credentials,
            window,
        };

        let mut last_error: Option<StrategyError> = None;
        for strategy in &self.strategies {
            let name = strategy.name();
            let t0 = Instant::now();
            let attempt = tokio::time::timeout(self.strategy_timeout, strategy.attempt(&ctx))
                .await
                .unwrap_or_else(|_| {
                    Err(StrategyError::Timeout(format!(
                        "{name} exceeded {}s",
                        self.strategy_timeout.as_secs()
                    )))
                });
            let ms = t0.elapsed().as_secs_f64() * 1000.0;
            histogram!("sync_strategy_ms", "platform" => platform.as_str(), "strategy" => name)
                .record(ms);

            match attempt {
                Ok(retrieved) => {
                    let mut report = self.ingest(user_id, retrieved).await;
                    report.strategy = Some(name);
                    if let Err(e) = self.vault.record_sync(user_id, platform).await {
                        warn!(%platform, user = %user, error = %e, "could not record sync time");
                    }
                    gauge!("sync_last_success_ts", "platform" => platform.as_str())
                        .set(Utc::now().timestamp() as f64);
                    info!(
                        %platform,
                        user = %user,
                        strategy = name,
                        upserted = report.records_processed,
                        skipped = report.rows_skipped,
                        dropped = report.rows_dropped,
                        "sync complete"
                    );
                    return report;
                }
                Err(e) => match e.class() {
                    FailureClass::Auth => {
                        counter!("sync_auth_failures_total", "platform" => platform.as_str())
                            .increment(1);
                        warn!(
                            %platform,
                            user = %user,
                            strategy = name,
                            error = %e,
                            "session rejected; marking credential expired"
                        );
                        let note = format!("Session expired: {e}");
                        if let Err(ve) = self
                            .vault
                            .update_status(
                                user_id,
                                platform,
                                CredentialStatus::Expired,
                                Some(&note),
                            )
                            .await
                        {
                            warn!(
                                %platform,
                                user = %user,
                                error = %ve,
                                "credential status not updated"
                            );
                        }
                        let mut report = SyncReport::failed(platform, e.into());
                        report.strategy = Some(name);
                        return report;
                    }
                    FailureClass::Transient => {
                        counter!(
                            "sync_strategy_failures_total",
                            "platform" => platform.as_str(),
                            "strategy" => name
                        )
                        .increment(1);
                        warn!(
                            %platform,
                            user = %user,
                            strategy = name,
                            error = %e,
                            "strategy failed; trying next"
                        );
                        last_error = Some(e);
                    }
                },
            }
        }

        let err = match last_error {
            Some(e) => e.into(),
            None => SyncError::Unavailable("no retrieval strategy configured".to_string()),
        };
        error!(%platform, user = %user, error = %err, "sync failed");
        SyncReport::failed(platform, err)
    }

    /// Map and upsert every row. Row failures are counted, never fatal.
    async fn ingest(&self, user_id: &str, retrieved: Retrieved) -> SyncReport {
        let platform = self.platform;
        let ctx = RowContext {
            user_id,
            platform,
            fields: retrieved.fields,
            missing_id: retrieved.missing_id,
            run_millis: Utc::now().timestamp_millis(),
        };

        let (mut upserted, mut skipped, mut dropped, mut synthetic) = (0, 0, 0, 0usize);
        for (position, row) in retrieved.rows.into_iter().enumerate() {
            let record = match row {
                Ok(r) => r,
                Err(e) => {
                    warn!(%platform, position, error = %e, "skipping malformed row");
                    skipped += 1;
                    continue;
                }
            };
            match map_row(&ctx, position, &record) {
                Ok(MappedRow::Event(event, source)) => {
                    match self.store.upsert_revenue_event(&event).await {
                        Ok(_) => {
                            upserted += 1;
                            if source == IdSource::Synthetic {
                                synthetic += 1;
                            }
                        }
                        Err(e) => {
                            warn!(
                                %platform,
                                position,
                                order_id = %event.order_id,
                                error = %e,
                                "row upsert failed"
                            );
                            skipped += 1;
                        }
                    }
                }
                Ok(MappedRow::Dropped) => {
                    debug!(%platform, position, "row without order id dropped");
                    dropped += 1;
                }
                Err(e) => {
                    warn!(%platform, position, error = %e, "skipping malformed row");
                    skipped += 1;
                }
            }
        }

        if synthetic > 0 {
            warn!(
                %platform,
                synthetic,
                "rows stored under minted order ids; repeated syncs will duplicate them"
            );
        }
        let label = platform.as_str();
        counter!("sync_rows_upserted_total", "platform" => label).increment(upserted as u64);
        counter!("sync_rows_skipped_total", "platform" => label).increment(skipped as u64);
        counter!("sync_rows_dropped_total", "platform" => label).increment(dropped as u64);
        counter!("sync_synthetic_ids_total", "platform" => label).increment(synthetic as u64);

        SyncReport {
            platform,
            success: true,
            records_processed: upserted,
            rows_skipped: skipped,
            rows_dropped: dropped,
            strategy: None,
            error: None,
        }
    }
}

/// Run every connector for one user, in order. One report per connector.
pub async fn sync_user(connectors: &[Connector], user_id: &str) -> Vec<SyncReport> {
    let mut reports = Vec::with_capacity(connectors.len());
    for c in connectors {
        reports.push(c.scrape_user(user_id).await);
    }
    reports
}
