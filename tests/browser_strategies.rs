// tests/browser_strategies.rs
mod common;

use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

use common::{cells, linked, FakeBrowser, Page, USER};
use creator_revenue::error::SyncError;
use creator_revenue::ingest::browser::{BrowserDriver, BrowserTimeouts};
use creator_revenue::ingest::export::BrowserExportStrategy;
use creator_revenue::ingest::providers::{amazon, mavely};
use creator_revenue::ingest::scrape::DomScrapeStrategy;
use creator_revenue::ingest::types::SyncWindow;
use creator_revenue::ingest::Connector;
use creator_revenue::model::{CredentialStatus, Platform};
use creator_revenue::store::RevenueStore;

const AMAZON_BASE: &str = "https://affiliate.test";
const MAVELY_BASE: &str = "https://mavely.test";

const AMAZON_CSV: &str = "\
Category,Product Name,ASIN,Date Shipped,Price($),Items Shipped,Revenue,Ad Fees,Order ID,Tracking ID
Home,Linen Duvet Cover,B0001,2024-03-04,$89.99,1,$89.99,$3.60,111-1,creator-20
Beauty,Lip Oil,B0002,2024-03-06,$18.00,2,$36.00,$1.44,111-2,creator-20
";

fn window() -> SyncWindow {
    SyncWindow::ending_at(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(), 30)
}

fn amazon_connector(
    browser: &Arc<FakeBrowser>,
    store: Arc<creator_revenue::store::MemoryStore>,
    vault: creator_revenue::vault::CredentialVault,
) -> Connector {
    let driver: Arc<dyn BrowserDriver> = browser.clone();
    Connector::new(Platform::Amazon, vault, store).with_strategy(BrowserExportStrategy::new(
        driver,
        amazon::export_page(AMAZON_BASE),
        BrowserTimeouts::default(),
    ))
}

#[tokio::test]
async fn amazon_export_is_parsed_and_session_closed() {
    let browser = FakeBrowser::new(Page {
        ready: true,
        export_csv: Some(AMAZON_CSV.to_string()),
        ..Default::default()
    });
    let (store, vault) = linked(Platform::Amazon).await;
    let report = amazon_connector(&browser, store.clone(), vault)
        .scrape_user_window(USER, window())
        .await;

    assert!(report.success, "{report:?}");
    assert_eq!(report.strategy, Some("browser_export"));
    assert_eq!(report.records_processed, 2);
    assert_eq!(browser.counters.closed(), 1);
    assert_eq!(browser.counters.aborted(), 0);

    let ev = store
        .revenue_event(Platform::Amazon, "111-2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ev.quantity, 2);
    assert_eq!(ev.order_amount, 36.0);
    assert_eq!(ev.commission_amount, 1.44);
    assert_eq!(ev.tracking_id.as_deref(), Some("creator-20"));
    assert_eq!(ev.product_category.as_deref(), Some("Beauty"));
    assert_eq!(ev.raw_payload["ASIN"], "B0002");
}

#[tokio::test]
async fn login_redirect_expires_credential_and_releases_browser() {
    let browser = FakeBrowser::new(Page {
        landed: Some(format!("{AMAZON_BASE}/ap/signin?return=reports")),
        ready: true,
        export_csv: Some(AMAZON_CSV.to_string()),
        ..Default::default()
    });
    let (store, vault) = linked(Platform::Amazon).await;
    let report = amazon_connector(&browser, store.clone(), vault.clone())
        .scrape_user_window(USER, window())
        .await;

    assert!(matches!(report.error, Some(SyncError::SessionExpired(_))));
    assert!(browser.counters.all_released());
    assert_eq!(browser.counters.opened(), 1);
    let entry = vault.entry(USER, Platform::Amazon).await.unwrap().unwrap();
    assert_eq!(entry.status, CredentialStatus::Expired);
    assert_eq!(store.revenue_event_count(), 0);
}

#[tokio::test]
async fn page_that_never_loads_is_transient_and_releases_browser() {
    let browser = FakeBrowser::new(Page {
        ready: false,
        ..Default::default()
    });
    let (store, vault) = linked(Platform::Amazon).await;
    let report = amazon_connector(&browser, store, vault.clone())
        .scrape_user_window(USER, window())
        .await;

    assert!(matches!(report.error, Some(SyncError::Timeout(_))));
    assert_eq!(browser.counters.closed(), 1);
    let entry = vault.entry(USER, Platform::Amazon).await.unwrap().unwrap();
    assert_eq!(entry.status, CredentialStatus::Active);
}

#[tokio::test]
async fn cancelled_attempt_aborts_browser_session() {
    let browser = FakeBrowser::new(Page {
        hang: true,
        ..Default::default()
    });
    let (store, vault) = linked(Platform::Amazon).await;
    let report = amazon_connector(&browser, store, vault)
        .with_strategy_timeout(Duration::from_millis(50))
        .scrape_user_window(USER, window())
        .await;

    assert!(matches!(report.error, Some(SyncError::Timeout(_))));
    assert_eq!(browser.counters.opened(), 1);
    assert_eq!(browser.counters.aborted(), 1);
    assert!(browser.counters.all_released());
}

#[tokio::test]
async fn mavely_without_export_falls_back_to_rendered_rows() {
    let browser = FakeBrowser::new(Page {
        ready: true,
        export_csv: None,
        table: vec![
            cells(&[
                ("product", "Denim Jacket"),
                ("amount", "$6.40"),
                ("date", "03/02/2024"),
                ("status", "pending"),
            ]),
            cells(&[("product", "Tote"), ("amount", "$2.10"), ("date", "03/09/2024")]),
            cells(&[("product", "Beanie"), ("amount", " "), ("date", "")]),
        ],
        ..Default::default()
    });
    let driver: Arc<dyn BrowserDriver> = browser.clone();
    let (store, vault) = linked(Platform::Mavely).await;
    let connector = Connector::new(Platform::Mavely, vault, store.clone())
        .with_strategy(BrowserExportStrategy::new(
            driver.clone(),
            mavely::export_page(MAVELY_BASE),
            BrowserTimeouts::default(),
        ))
        .with_strategy(DomScrapeStrategy::new(
            driver,
            mavely::scrape_page(MAVELY_BASE),
            BrowserTimeouts::default(),
        ));

    let report = connector.scrape_user_window(USER, window()).await;
    assert!(report.success, "{report:?}");
    assert_eq!(report.strategy, Some("dom_scrape"));
    assert_eq!(report.records_processed, 3);
    assert_eq!(browser.counters.opened(), 2);
    assert_eq!(browser.counters.closed(), 2);

    let events = store.all_revenue_events();
    let jacket = events
        .iter()
        .find(|e| e.product_name.as_deref() == Some("Denim Jacket"))
        .unwrap();
    assert!(jacket.order_id.starts_with("mavely_"));
    assert_eq!(jacket.commission_amount, 6.4);
    assert_eq!(jacket.order_date, NaiveDate::from_ymd_opt(2024, 3, 2));
    let beanie = events
        .iter()
        .find(|e| e.product_name.as_deref() == Some("Beanie"))
        .unwrap();
    assert_eq!(beanie.commission_amount, 0.0);
    assert_eq!(beanie.order_date, None);
}

#[tokio::test]
async fn cookies_are_injected_into_each_session() {
    let browser = FakeBrowser::new(Page {
        ready: true,
        export_csv: Some("Order ID,Earnings\n".to_string()),
        ..Default::default()
    });
    let (store, vault) = linked(Platform::Amazon).await;
    let report = amazon_connector(&browser, store, vault)
        .scrape_user_window(USER, window())
        .await;

    assert!(report.success);
    assert_eq!(report.records_processed, 0);
    assert_eq!(
        browser
            .counters
            .cookies_seen
            .load(std::sync::atomic::Ordering::SeqCst),
        2
    );
}
