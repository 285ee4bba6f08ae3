// src/ingest/scrape.rs
//! DOM scrape of a rendered earnings table, for pages without an export.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::StrategyError;
use crate::ingest::browser::{
    BrowserDriver, BrowserScope, BrowserSession, BrowserTimeouts, SessionSetup, TableSpec,
};
use crate::ingest::fields::{FieldMap, MissingIdPolicy, RawRecord};
use crate::ingest::http::url_has_login_marker;
use crate::ingest::types::{AttemptContext, RetrievalStrategy, Retrieved};

#[derive(Debug, Clone)]
pub struct ScrapePage {
    pub origin: String,
    pub cookie_domain: &'static str,
    pub url: String,
    pub login_markers: &'static [&'static str],
    pub ready_selector: &'static str,
    pub table: TableSpec,
    pub fields: &'static FieldMap,
}

pub struct DomScrapeStrategy {
    driver: Arc<dyn BrowserDriver>,
    page: ScrapePage,
    timeouts: BrowserTimeouts,
}

impl DomScrapeStrategy {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        page: ScrapePage,
        timeouts: BrowserTimeouts,
    ) -> Self {
        Self {
            driver,
            page,
            timeouts,
        }
    }

    async fn scrape(
        &self,
        session: &mut dyn BrowserSession,
    ) -> Result<Vec<HashMap<String, String>>, StrategyError> {
        let landed = session.navigate(&self.page.url, self.timeouts.navigation).await?;
        if url_has_login_marker(&landed, self.page.login_markers) {
            return Err(StrategyError::SessionExpired(format!(
                "redirected to login ({landed})"
            )));
        }
        session
            .wait_for(self.page.ready_selector, self.timeouts.selector)
            .await?;
        Ok(session.extract_table(&self.page.table).await?)
    }
}

fn cells_to_record(cells: HashMap<String, String>) -> RawRecord {
    cells
        .into_iter()
        .filter_map(|(k, v)| {
            let v = v.trim().to_string();
            (!v.is_empty()).then(|| (k, Value::String(v)))
        })
        .collect()
}

#[async_trait]
impl RetrievalStrategy for DomScrapeStrategy {
    async fn attempt(&self, ctx: &AttemptContext<'_>) -> Result<Retrieved, StrategyError> {
        let setup = SessionSetup {
            origin: self.page.origin.clone(),
            cookies: ctx.credentials.browser_cookies(self.page.cookie_domain),
        };
        let mut scope = BrowserScope::open(self.driver.as_ref(), &setup).await?;
        let result = self.scrape(scope.session()).await;
        scope.release().await;

        let rows = result?
            .into_iter()
            .map(|cells| Ok(cells_to_record(cells)))
            .collect();

        Ok(Retrieved {
            rows,
            fields: self.page.fields,
            missing_id: MissingIdPolicy::Synthesize,
        })
    }

    fn name(&self) -> &'static str {
        "dom_scrape"
    }
}
