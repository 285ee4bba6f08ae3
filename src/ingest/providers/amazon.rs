// src/ingest/providers/amazon.rs
//! Amazon Associates: the earnings report only exists as a browser export.

use crate::ingest::export::{BrowserExportStrategy, DateRangeControls, ExportPage};
use crate::ingest::fields::FieldMap;
use crate::ingest::providers::ConnectorDeps;
use crate::ingest::Connector;
use crate::model::Platform;

pub const COOKIE_DOMAIN: &str = ".amazon.com";
pub const LOGIN_MARKERS: &[&str] = &["signin", "/ap/"];

pub static CSV_FIELDS: FieldMap = FieldMap {
    order_id: &["Order ID", "Tracking ID"],
    product_name: &["Product Name", "Item Name", "Name"],
    product_category: &["Category"],
    quantity: &["Quantity", "Items Shipped", "Qty"],
    order_amount: &["Revenue", "Product Price", "Price($)"],
    commission_amount: &["Earnings", "Ad Fees", "Ad Fees($)"],
    commission_rate: &["Rate", "Commission Rate"],
    order_date: &["Date", "Date Shipped"],
    tracking_id: &["Tracking ID"],
    click_date: &[],
};

pub fn export_page(base: &str) -> ExportPage {
    let base = base.trim_end_matches('/');
    ExportPage {
        origin: base.to_string(),
        cookie_domain: COOKIE_DOMAIN,
        report_url: format!("{base}/home/reports/table"),
        login_markers: LOGIN_MARKERS,
        ready_selector: ".ac-report-table",
        date_range: Some(DateRangeControls {
            opener: "#ac-daterange-picker",
            start_input: "input[name='startDate']",
            end_input: "input[name='endDate']",
            apply: ".ac-daterange-apply, button[type='submit']",
            format: "%m/%d/%Y",
        }),
        download_selector: "#ac-report-download-launcher-osp",
        fields: &CSV_FIELDS,
    }
}

pub fn connector(deps: &ConnectorDeps) -> Connector {
    let mut c = deps.base(Platform::Amazon);
    if let Some(driver) = &deps.browser {
        c = c.with_strategy(BrowserExportStrategy::new(
            driver.clone(),
            export_page(&deps.endpoints.amazon_base),
            deps.browser_timeouts,
        ));
    }
    c
}
