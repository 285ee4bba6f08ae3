// src/ingest/providers/mavely.rs
//! Mavely: earnings export when the page offers one, otherwise the rendered rows.

use crate::ingest::browser::TableSpec;
use crate::ingest::export::{BrowserExportStrategy, DateRangeControls, ExportPage};
use crate::ingest::fields::FieldMap;
use crate::ingest::providers::ConnectorDeps;
use crate::ingest::scrape::{DomScrapeStrategy, ScrapePage};
use crate::ingest::Connector;
use crate::model::Platform;

pub const COOKIE_DOMAIN: &str = ".mavely.com";
pub const LOGIN_MARKERS: &[&str] = &["login", "signin", "auth"];
const READY: &str = "[data-testid='earnings-list'], .earnings-table, .transaction-list";

pub static CSV_FIELDS: FieldMap = FieldMap {
    order_id: &["Order ID", "Transaction ID", "ID"],
    product_name: &["Product", "Item", "Product Name"],
    product_category: &["Category", "Brand"],
    quantity: &["Quantity"],
    order_amount: &["Sale Amount", "Order Total"],
    commission_amount: &["Commission", "Earnings"],
    commission_rate: &["Rate", "Commission Rate"],
    order_date: &["Date", "Order Date"],
    tracking_id: &["Link ID", "Tracking ID"],
    click_date: &[],
};

pub static DOM_FIELDS: FieldMap = FieldMap {
    order_id: &[],
    product_name: &["product"],
    product_category: &[],
    quantity: &[],
    order_amount: &[],
    commission_amount: &["amount"],
    commission_rate: &[],
    order_date: &["date"],
    tracking_id: &[],
    click_date: &[],
};

const DOM_COLUMNS: &[(&str, &str)] = &[
    ("product", ".product-name, .item-name, td:nth-child(1)"),
    ("amount", ".commission, .earnings, td:nth-child(2), .amount"),
    ("date", ".date, td:nth-child(3), .transaction-date"),
    ("status", ".status, td:nth-child(4)"),
];

fn earnings_url(base: &str) -> String {
    format!("{}/dashboard/earnings", base.trim_end_matches('/'))
}

pub fn export_page(base: &str) -> ExportPage {
    ExportPage {
        origin: base.trim_end_matches('/').to_string(),
        cookie_domain: COOKIE_DOMAIN,
        report_url: earnings_url(base),
        login_markers: LOGIN_MARKERS,
        ready_selector: READY,
        date_range: Some(DateRangeControls {
            opener: "[data-testid='date-picker'], .date-range-picker, #dateRange",
            start_input: "input[name='startDate'], input[placeholder*='Start']",
            end_input: "input[name='endDate'], input[placeholder*='End']",
            apply: "[data-testid='apply-date-range'], button.apply",
            format: "%m/%d/%Y",
        }),
        download_selector: "[data-testid='export-btn'], .export-button",
        fields: &CSV_FIELDS,
    }
}

pub fn scrape_page(base: &str) -> ScrapePage {
    ScrapePage {
        origin: base.trim_end_matches('/').to_string(),
        cookie_domain: COOKIE_DOMAIN,
        url: earnings_url(base),
        login_markers: LOGIN_MARKERS,
        ready_selector: READY,
        table: TableSpec {
            row_selector: ".earnings-row, .transaction-row, tr[data-testid='earning-item']",
            columns: DOM_COLUMNS,
        },
        fields: &DOM_FIELDS,
    }
}

pub fn connector(deps: &ConnectorDeps) -> Connector {
    let mut c = deps.base(Platform::Mavely);
    if let Some(driver) = &deps.browser {
        let base = &deps.endpoints.mavely_base;
        c = c
            .with_strategy(BrowserExportStrategy::new(
                driver.clone(),
                export_page(base),
                deps.browser_timeouts,
            ))
            .with_strategy(DomScrapeStrategy::new(
                driver.clone(),
                scrape_page(base),
                deps.browser_timeouts,
            ));
    }
    c
}
