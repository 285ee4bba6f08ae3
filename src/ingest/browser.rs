// src/ingest/browser.rs
//! Browser automation seam.
//!
//! The driver is a black box that satisfies two contracts: a login redirect leaves a login
//! marker in the final URL, and an export action produces a readable file. Sessions are
//! exclusive per run and must be torn down on every exit path; [`BrowserScope`] enforces that.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use crate::error::BrowserError;
use crate::vault::BrowserCookie;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowserTimeouts {
    pub navigation: Duration,
    pub selector: Duration,
    pub download: Duration,
}

impl Default for BrowserTimeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            selector: Duration::from_secs(15),
            download: Duration::from_secs(10),
        }
    }
}

/// How to prepare a fresh browser context before navigating.
#[derive(Debug, Clone)]
pub struct SessionSetup {
    /// Page visited first so cookies can be set for its domain.
    pub origin: String,
    pub cookies: Vec<BrowserCookie>,
}

/// Rows to extract from a rendered table: each column is a child selector.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub row_selector: &'static str,
    pub columns: &'static [(&'static str, &'static str)],
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn open(&self, setup: &SessionSetup) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate and return the URL the page settled on (after redirects).
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<String, BrowserError>;

    /// Wait until `selector` matches. `Err(Timeout)` when it never does.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn exists(&mut self, selector: &str) -> Result<bool, BrowserError>;

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError>;

    /// Replace the value of an input. `Ok(false)` when the input is absent.
    async fn fill(&mut self, selector: &str, value: &str) -> Result<bool, BrowserError>;

    /// Text of each column for every row; missing cells are absent from the row map.
    async fn extract_table(
        &mut self,
        spec: &TableSpec,
    ) -> Result<Vec<HashMap<String, String>>, BrowserError>;

    /// Click the trigger and return the downloaded file's contents.
    /// `Ok(None)` when the trigger is absent.
    async fn download(
        &mut self,
        trigger_selector: &str,
        timeout: Duration,
    ) -> Result<Option<String>, BrowserError>;

    async fn close(&mut self) -> Result<(), BrowserError>;

    /// Best-effort synchronous teardown, used when a session is dropped without `close`.
    fn abort(&mut self);
}

/// Owns one browser session for the duration of a strategy attempt.
///
/// Normal paths call [`BrowserScope::release`]. If the owning future is cancelled (e.g. by a
/// deadline) the session is aborted on drop instead, so automation processes never leak.
pub struct BrowserScope {
    session: Box<dyn BrowserSession>,
    released: bool,
}

impl BrowserScope {
    pub async fn open(
        driver: &dyn BrowserDriver,
        setup: &SessionSetup,
    ) -> Result<Self, BrowserError> {
        let session = driver.open(setup).await?;
        Ok(Self {
            session,
            released: false,
        })
    }

    pub fn session(&mut self) -> &mut dyn BrowserSession {
        self.session.as_mut()
    }

    pub async fn release(mut self) {
        if let Err(e) = self.session.close().await {
            warn!(error = %e, "browser session close failed; aborting");
            self.session.abort();
        }
        self.released = true;
    }
}

impl Drop for BrowserScope {
    fn drop(&mut self) {
        if !self.released {
            warn!("browser session dropped without release; aborting");
            self.session.abort();
        }
    }
}
