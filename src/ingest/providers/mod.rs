// src/ingest/providers/mod.rs
//! Per-platform strategy chains.
//!
//! | platform | chain                                  |
//! |----------|----------------------------------------|
//! | amazon   | browser export                         |
//! | ltk      | api, dom scrape                        |
//! | shopmy   | api                                    |
//! | mavely   | browser export, dom scrape             |
//!
//! Browser strategies are only wired when a driver is configured.

pub mod amazon;
pub mod ltk;
pub mod mavely;
pub mod shopmy;

use std::sync::Arc;

use crate::config::{AppConfig, Endpoints};
use crate::ingest::browser::{BrowserDriver, BrowserTimeouts};
use crate::ingest::Connector;
use crate::model::Platform;
use crate::store::RevenueStore;
use crate::vault::CredentialVault;

/// Shared collaborators handed to every connector.
#[derive(Clone)]
pub struct ConnectorDeps {
    pub vault: CredentialVault,
    pub store: Arc<dyn RevenueStore>,
    pub http: reqwest::Client,
    pub browser: Option<Arc<dyn BrowserDriver>>,
    pub browser_timeouts: BrowserTimeouts,
    pub endpoints: Endpoints,
    pub max_pages: u32,
    pub window_days: u32,
    pub strategy_timeout: std::time::Duration,
}

impl ConnectorDeps {
    pub fn from_config(
        cfg: &AppConfig,
        vault: CredentialVault,
        store: Arc<dyn RevenueStore>,
        http: reqwest::Client,
        browser: Option<Arc<dyn BrowserDriver>>,
    ) -> Self {
        Self {
            vault,
            store,
            http,
            browser,
            browser_timeouts: cfg.browser.timeouts(),
            endpoints: cfg.endpoints.clone(),
            max_pages: cfg.http.max_pages,
            window_days: cfg.sync.window_days,
            strategy_timeout: cfg.sync.strategy_timeout(),
        }
    }

    fn base(&self, platform: Platform) -> Connector {
        Connector::new(platform, self.vault.clone(), self.store.clone())
            .with_window_days(self.window_days)
            .with_strategy_timeout(self.strategy_timeout)
    }
}

pub fn connector(platform: Platform, deps: &ConnectorDeps) -> Connector {
    match platform {
        Platform::Amazon => amazon::connector(deps),
        Platform::Ltk => ltk::connector(deps),
        Platform::ShopMy => shopmy::connector(deps),
        Platform::Mavely => mavely::connector(deps),
    }
}

pub fn build_all(deps: &ConnectorDeps) -> Vec<Connector> {
    Platform::ALL.iter().map(|p| connector(*p, deps)).collect()
}
