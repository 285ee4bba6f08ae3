// src/ingest/export.rs
//! Browser-session replay: inject cookies, open the report page, trigger the export, read the CSV.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::error::{BrowserError, RowError, StrategyError};
use crate::ingest::browser::{
    BrowserDriver, BrowserScope, BrowserSession, BrowserTimeouts, SessionSetup,
};
use crate::ingest::fields::{FieldMap, MissingIdPolicy, RawRecord};
use crate::ingest::http::url_has_login_marker;
use crate::ingest::types::{AttemptContext, RetrievalStrategy, Retrieved, SyncWindow};

/// Date-range picker on a report page. Setting it is best effort.
#[derive(Debug, Clone)]
pub struct DateRangeControls {
    pub opener: &'static str,
    pub start_input: &'static str,
    pub end_input: &'static str,
    pub apply: &'static str,
    /// strftime pattern the inputs expect.
    pub format: &'static str,
}

#[derive(Debug, Clone)]
pub struct ExportPage {
    pub origin: String,
    pub cookie_domain: &'static str,
    pub report_url: String,
    pub login_markers: &'static [&'static str],
    pub ready_selector: &'static str,
    pub date_range: Option<DateRangeControls>,
    pub download_selector: &'static str,
    pub fields: &'static FieldMap,
}

pub struct BrowserExportStrategy {
    driver: Arc<dyn BrowserDriver>,
    page: ExportPage,
    timeouts: BrowserTimeouts,
}

impl BrowserExportStrategy {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        page: ExportPage,
        timeouts: BrowserTimeouts,
    ) -> Self {
        Self {
            driver,
            page,
            timeouts,
        }
    }

    async fn export(
        &self,
        session: &mut dyn BrowserSession,
        window: SyncWindow,
    ) -> Result<Option<String>, StrategyError> {
        let landed = session
            .navigate(&self.page.report_url, self.timeouts.navigation)
            .await?;
        if url_has_login_marker(&landed, self.page.login_markers) {
            return Err(StrategyError::SessionExpired(format!(
                "redirected to login ({landed})"
            )));
        }

        session
            .wait_for(self.page.ready_selector, self.timeouts.selector)
            .await?;

        if let Some(controls) = &self.page.date_range {
            if let Err(e) = set_date_range(session, controls, window).await {
                debug!(error = %e, "date range not applied; using page default");
            }
        }

        Ok(session
            .download(self.page.download_selector, self.timeouts.download)
            .await?)
    }
}

async fn set_date_range(
    session: &mut dyn BrowserSession,
    controls: &DateRangeControls,
    window: SyncWindow,
) -> Result<(), BrowserError> {
    if !session.exists(controls.opener).await? {
        return Ok(());
    }
    session.click(controls.opener).await?;
    session
        .fill(controls.start_input, &fmt_date(window.start, controls.format))
        .await?;
    session
        .fill(controls.end_input, &fmt_date(window.end, controls.format))
        .await?;
    if session.exists(controls.apply).await? {
        session.click(controls.apply).await?;
    }
    Ok(())
}

fn fmt_date(d: NaiveDate, format: &str) -> String {
    d.format(format).to_string()
}

#[async_trait]
impl RetrievalStrategy for BrowserExportStrategy {
    async fn attempt(&self, ctx: &AttemptContext<'_>) -> Result<Retrieved, StrategyError> {
        let setup = SessionSetup {
            origin: self.page.origin.clone(),
            cookies: ctx.credentials.browser_cookies(self.page.cookie_domain),
        };
        let mut scope = BrowserScope::open(self.driver.as_ref(), &setup).await?;
        let result = self.export(scope.session(), ctx.window).await;
        scope.release().await;

        match result? {
            Some(csv_text) => Ok(Retrieved {
                rows: parse_csv_rows(&csv_text),
                fields: self.page.fields,
                missing_id: MissingIdPolicy::Drop,
            }),
            None => Err(StrategyError::Unavailable(
                "report page has no export control".to_string(),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "browser_export"
    }
}

/// Header-keyed CSV records. A record that does not fit the header is a row error;
/// the remaining records still parse.
pub fn parse_csv_rows(text: &str) -> Vec<Result<RawRecord, RowError>> {
    let text = text.trim_start_matches('\u{feff}');
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = match rdr.headers() {
        Ok(h) => h.clone(),
        Err(e) => return vec![Err(RowError::Malformed(e.to_string()))],
    };

    rdr.records()
        .map(|rec| {
            let rec = rec.map_err(|e| RowError::Malformed(e.to_string()))?;
            Ok(headers
                .iter()
                .zip(rec.iter())
                .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
                .collect())
        })
        .collect()
}
