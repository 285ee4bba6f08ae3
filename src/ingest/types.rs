// src/ingest/types.rs
use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::error::{RowError, StrategyError, SyncError};
use crate::ingest::fields::{FieldMap, MissingIdPolicy, RawRecord};
use crate::model::Platform;
use crate::vault::CredentialSet;

/// Date range requested from a platform. Passed per run, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SyncWindow {
    pub fn trailing_days(days: u32) -> Self {
        let end = Utc::now().date_naive();
        Self::ending_at(end, days)
    }

    pub fn ending_at(end: NaiveDate, days: u32) -> Self {
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
        }
    }
}

/// Inputs available to a strategy attempt.
#[derive(Debug, Clone, Copy)]
pub struct AttemptContext<'a> {
    pub user_id: &'a str,
    pub platform: Platform,
    pub credentials: &'a CredentialSet,
    pub window: SyncWindow,
}

/// Rows returned by a successful attempt, with the mapping needed to read them.
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub rows: Vec<Result<RawRecord, RowError>>,
    pub fields: &'static FieldMap,
    pub missing_id: MissingIdPolicy,
}

/// One way of fetching a platform's revenue rows.
///
/// Returning `Ok` (even with zero rows) ends the chain. Errors are classified by
/// [`StrategyError::class`].
#[async_trait::async_trait]
pub trait RetrievalStrategy: Send + Sync {
    async fn attempt(&self, ctx: &AttemptContext<'_>) -> Result<Retrieved, StrategyError>;
    fn name(&self) -> &'static str;
}

/// Structured outcome of one connector run. Failures are values, not panics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub platform: Platform,
    pub success: bool,
    pub records_processed: usize,
    pub rows_skipped: usize,
    pub rows_dropped: usize,
    pub strategy: Option<&'static str>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<SyncError>,
}

fn serialize_error<S: serde::Serializer>(e: &Option<SyncError>, s: S) -> Result<S::Ok, S::Error> {
    match e {
        Some(err) => s.serialize_some(&err.to_string()),
        None => s.serialize_none(),
    }
}

impl SyncReport {
    pub fn failed(platform: Platform, error: SyncError) -> Self {
        Self {
            platform,
            success: false,
            records_processed: 0,
            rows_skipped: 0,
            rows_dropped: 0,
            strategy: None,
            error: Some(error),
        }
    }
}
