// src/ingest/providers/ltk.rs
//! LTK (rewardStyle): analytics API first, rendered analytics page as fallback.

use crate::ingest::browser::TableSpec;
use crate::ingest::fields::FieldMap;
use crate::ingest::http::{ApiEndpoint, JsonApiStrategy};
use crate::ingest::providers::ConnectorDeps;
use crate::ingest::scrape::{DomScrapeStrategy, ScrapePage};
use crate::ingest::Connector;
use crate::model::Platform;

pub const COOKIE_DOMAIN: &str = ".liketoknow.it";
pub const LOGIN_MARKERS: &[&str] = &["login", "signin"];

pub static API_FIELDS: FieldMap = FieldMap {
    order_id: &["orderId", "id"],
    product_name: &["productName", "itemName"],
    product_category: &["category"],
    quantity: &["quantity"],
    order_amount: &["saleAmount"],
    commission_amount: &["commission", "earnings"],
    commission_rate: &["commissionRate"],
    order_date: &["orderDate", "date"],
    tracking_id: &["trackingId"],
    click_date: &[],
};

pub static DOM_FIELDS: FieldMap = FieldMap {
    order_id: &["order_id"],
    product_name: &["product_name"],
    product_category: &[],
    quantity: &[],
    order_amount: &[],
    commission_amount: &["commission"],
    commission_rate: &[],
    order_date: &["date"],
    tracking_id: &[],
    click_date: &[],
};

const DOM_COLUMNS: &[(&str, &str)] = &[
    ("product_name", ".product-name, .item-name"),
    ("commission", ".commission, .earnings-amount"),
    ("date", ".date, .transaction-date"),
    ("order_id", ".order-id"),
];

pub fn api_endpoint(base: &str, api: &str) -> ApiEndpoint {
    let base = base.trim_end_matches('/');
    ApiEndpoint {
        url: format!("{}/v1/analytics/earnings", api.trim_end_matches('/')),
        origin: base.to_string(),
        referer: format!("{base}/analytics"),
        start_param: "startDate",
        end_param: "endDate",
        items_keys: &["earnings", "data"],
        pagination: None,
        login_markers: LOGIN_MARKERS,
        fields: &API_FIELDS,
    }
}

pub fn scrape_page(base: &str) -> ScrapePage {
    let base = base.trim_end_matches('/');
    ScrapePage {
        origin: base.to_string(),
        cookie_domain: COOKIE_DOMAIN,
        url: format!("{base}/analytics"),
        login_markers: LOGIN_MARKERS,
        ready_selector: "[data-testid='earnings-card']",
        table: TableSpec {
            row_selector: ".transaction-item, .earnings-row",
            columns: DOM_COLUMNS,
        },
        fields: &DOM_FIELDS,
    }
}

pub fn connector(deps: &ConnectorDeps) -> Connector {
    let e = &deps.endpoints;
    let mut c = deps
        .base(Platform::Ltk)
        .with_strategy(JsonApiStrategy::new(
            deps.http.clone(),
            api_endpoint(&e.ltk_base, &e.ltk_api),
        ));
    if let Some(driver) = &deps.browser {
        c = c.with_strategy(DomScrapeStrategy::new(
            driver.clone(),
            scrape_page(&e.ltk_base),
            deps.browser_timeouts,
        ));
    }
    c
}
