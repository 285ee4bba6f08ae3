// src/error.rs
//! Error taxonomy shared by the vault, stores, strategies and connectors.

use thiserror::Error;

use crate::model::CredentialStatus;

/// Persistence failures. The store is an external collaborator; its errors are opaque.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("corrupt stored value in {field}: {reason}")]
    Corrupt { field: &'static str, reason: String },

    #[error("not found: {0}")]
    NotFound(String),
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Credential vault failures.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Blob could not be decoded, authenticated or deserialized. Never mapped to "no credential".
    #[error("credential decryption failed: {0}")]
    Decryption(String),

    #[error("credential encryption failed: {0}")]
    Encryption(String),

    #[error("vault key unavailable: {0}")]
    Key(String),

    #[error("credential status cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Browser automation driver failures.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser timeout: {0}")]
    Timeout(String),

    #[error("element not found: {0}")]
    ElementMissing(String),

    #[error("browser driver error: {0}")]
    Driver(String),
}

/// How a failed retrieval attempt affects the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Session rejected: mark credential expired, stop the chain.
    Auth,
    /// Anything else: credential untouched, next strategy may run.
    Transient,
}

/// Failure of one retrieval strategy.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl StrategyError {
    pub fn class(&self) -> FailureClass {
        match self {
            StrategyError::SessionExpired(_) => FailureClass::Auth,
            StrategyError::Timeout(_) | StrategyError::Unavailable(_) => FailureClass::Transient,
        }
    }
}

impl From<BrowserError> for StrategyError {
    fn from(e: BrowserError) -> Self {
        match e {
            BrowserError::Timeout(what) => StrategyError::Timeout(what),
            other => StrategyError::Unavailable(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for StrategyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return StrategyError::Timeout(e.to_string());
        }
        if let Some(status) = e.status() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return StrategyError::SessionExpired(format!("http {status}"));
            }
        }
        StrategyError::Unavailable(e.to_string())
    }
}

/// A single raw row that could not be turned into a revenue event.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RowError {
    #[error("row is not an object")]
    NotAnObject,

    #[error("field {field}: cannot parse {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("malformed source row: {0}")]
    Malformed(String),
}

/// Failure reported by a connector run. Every variant is returned, never thrown.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    #[error("no credentials found")]
    CredentialMissing,

    /// Stored credential is not `active`; only a relink brings it back.
    #[error("credential is {0}; relink required")]
    CredentialInactive(CredentialStatus),

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("credential decryption failed: {0}")]
    Decryption(String),

    #[error("all retrieval strategies failed: {0}")]
    Unavailable(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<StrategyError> for SyncError {
    fn from(e: StrategyError) -> Self {
        match e {
            StrategyError::SessionExpired(m) => SyncError::SessionExpired(m),
            StrategyError::Timeout(m) => SyncError::Timeout(m),
            StrategyError::Unavailable(m) => SyncError::Unavailable(m),
        }
    }
}

impl From<VaultError> for SyncError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::Decryption(m) => SyncError::Decryption(m),
            VaultError::Store(s) => SyncError::Store(s.to_string()),
            other => SyncError::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_session_expiry_is_auth_class() {
        assert_eq!(
            StrategyError::SessionExpired("401".into()).class(),
            FailureClass::Auth
        );
        assert_eq!(
            StrategyError::Timeout("goto".into()).class(),
            FailureClass::Transient
        );
        assert_eq!(
            StrategyError::Unavailable("no export".into()).class(),
            FailureClass::Transient
        );
    }

    #[test]
    fn browser_timeout_maps_to_transient_timeout() {
        let e: StrategyError = BrowserError::Timeout("page load".into()).into();
        assert!(matches!(e, StrategyError::Timeout(_)));
        let e: StrategyError = BrowserError::ElementMissing("#x".into()).into();
        assert!(matches!(e, StrategyError::Unavailable(_)));
    }

    #[test]
    fn decryption_stays_distinct_in_sync_error() {
        let e: SyncError = VaultError::Decryption("bad tag".into()).into();
        assert_eq!(e, SyncError::Decryption("bad tag".into()));
        assert_eq!(SyncError::CredentialMissing.to_string(), "no credentials found");
    }
}
