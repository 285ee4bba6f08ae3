// src/ingest/http.rs
//! Direct API retrieval using credential-derived auth.

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, COOKIE, ORIGIN, REFERER};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{RowError, StrategyError};
use crate::ingest::fields::{FieldMap, MissingIdPolicy, RawRecord};
use crate::ingest::types::{AttemptContext, RetrievalStrategy, Retrieved, SyncWindow};
use crate::vault::CredentialSet;

/// Page/per-page query parameters plus where the response reports the page count.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub page_param: &'static str,
    pub per_page_param: &'static str,
    pub per_page: u32,
    /// JSON pointer to the total page count, e.g. `/meta/total_pages`.
    pub total_pages_pointer: &'static str,
    pub max_pages: u32,
}

/// Static description of one platform's earnings endpoint.
#[derive(Debug, Clone)]
pub struct ApiEndpoint {
    pub url: String,
    pub origin: String,
    pub referer: String,
    pub start_param: &'static str,
    pub end_param: &'static str,
    /// Keys that may hold the item array, in priority order.
    pub items_keys: &'static [&'static str],
    pub pagination: Option<Pagination>,
    pub login_markers: &'static [&'static str],
    pub fields: &'static FieldMap,
}

pub struct JsonApiStrategy {
    client: reqwest::Client,
    endpoint: ApiEndpoint,
}

impl JsonApiStrategy {
    pub fn new(client: reqwest::Client, endpoint: ApiEndpoint) -> Self {
        Self { client, endpoint }
    }

    async fn fetch_page(
        &self,
        headers: &HeaderMap,
        window: SyncWindow,
        page: Option<u32>,
    ) -> Result<Value, StrategyError> {
        let ep = &self.endpoint;
        let mut query: Vec<(&str, String)> = vec![
            (ep.start_param, window.start.format("%Y-%m-%d").to_string()),
            (ep.end_param, window.end.format("%Y-%m-%d").to_string()),
        ];
        if let (Some(p), Some(page)) = (&ep.pagination, page) {
            query.push((p.page_param, page.to_string()));
            query.push((p.per_page_param, p.per_page.to_string()));
        }

        let resp = self
            .client
            .get(&ep.url)
            .headers(headers.clone())
            .query(&query)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(StrategyError::SessionExpired(format!("api returned {status}")));
        }
        if url_has_login_marker(resp.url().as_str(), ep.login_markers) {
            return Err(StrategyError::SessionExpired(
                "api redirected to login".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(StrategyError::Unavailable(format!("api error: {status}")));
        }
        Ok(resp.json::<Value>().await?)
    }

    fn items<'v>(&self, body: &'v Value) -> Option<&'v Vec<Value>> {
        if let Some(arr) = body.as_array() {
            return Some(arr);
        }
        self.endpoint
            .items_keys
            .iter()
            .find_map(|k| body.get(*k).and_then(Value::as_array))
    }
}

#[async_trait]
impl RetrievalStrategy for JsonApiStrategy {
    async fn attempt(&self, ctx: &AttemptContext<'_>) -> Result<Retrieved, StrategyError> {
        let headers = auth_headers(ctx.credentials, &self.endpoint.origin, &self.endpoint.referer)
            .map_err(|e| StrategyError::Unavailable(e.to_string()))?;

        let first_page = self.endpoint.pagination.as_ref().map(|_| 1);
        let body = self.fetch_page(&headers, ctx.window, first_page).await?;
        let mut items: Vec<Value> = self
            .items(&body)
            .ok_or_else(|| {
                StrategyError::Unavailable("response carried no earnings list".to_string())
            })?
            .clone();

        if let Some(p) = &self.endpoint.pagination {
            let total = body
                .pointer(p.total_pages_pointer)
                .and_then(Value::as_u64)
                .unwrap_or(1)
                .min(u64::from(p.max_pages)) as u32;
            for page in 2..=total {
                match self.fetch_page(&headers, ctx.window, Some(page)).await {
                    Ok(v) => match self.items(&v) {
                        Some(more) => items.extend(more.iter().cloned()),
                        None => {
                            warn!(
                                platform = %ctx.platform,
                                page,
                                "page without earnings list; stop paging"
                            );
                            break;
                        }
                    },
                    Err(e @ StrategyError::SessionExpired(_)) => return Err(e),
                    Err(e) => {
                        warn!(
                            platform = %ctx.platform,
                            page,
                            error = %e,
                            "page fetch failed; keeping earlier pages"
                        );
                        break;
                    }
                }
            }
        }

        debug!(platform = %ctx.platform, items = items.len(), "api items fetched");
        let rows = items
            .into_iter()
            .map(|v| match v {
                Value::Object(m) => Ok::<RawRecord, RowError>(m),
                _ => Err(RowError::NotAnObject),
            })
            .collect();

        Ok(Retrieved {
            rows,
            fields: self.endpoint.fields,
            missing_id: MissingIdPolicy::Drop,
        })
    }

    fn name(&self) -> &'static str {
        "api"
    }
}

/// Headers for an authenticated API call: bearer token when the credential has one,
/// otherwise the whole set as a `Cookie` header.
pub fn auth_headers(
    credentials: &CredentialSet,
    origin: &str,
    referer: &str,
) -> AnyResult<HeaderMap> {
    let mut h = HeaderMap::new();
    h.insert(ACCEPT, HeaderValue::from_static("application/json"));
    h.insert(ORIGIN, HeaderValue::from_str(origin)?);
    h.insert(REFERER, HeaderValue::from_str(referer)?);
    match credentials.bearer_token() {
        Some(token) => {
            h.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
        }
        None => {
            h.insert(COOKIE, HeaderValue::from_str(&credentials.cookie_header())?);
        }
    }
    Ok(h)
}

/// Login redirects are recognised by markers in the final URL.
pub fn url_has_login_marker(url: &str, markers: &[&str]) -> bool {
    let lower = url.to_ascii_lowercase();
    markers.iter().any(|m| lower.contains(m))
}
