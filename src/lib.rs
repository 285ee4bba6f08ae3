// src/lib.rs
// Public library surface for the CLI and integration tests.

pub mod attribution;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod store;
pub mod vault;

// ---- Re-exports for stable public API ----
pub use crate::attribution::{AttributionEngine, AttributionOutcome, AttributionSummary};
pub use crate::config::AppConfig;
pub use crate::error::{StoreError, SyncError, VaultError};
pub use crate::ingest::types::{SyncReport, SyncWindow};
pub use crate::ingest::{sync_user, Connector};
pub use crate::model::{CredentialStatus, Platform, RevenueEvent};
pub use crate::vault::{CredentialSet, CredentialVault};
