// tests/config_file.rs
use std::path::Path;
use std::time::Duration;

use creator_revenue::config::AppConfig;

#[test]
fn shipped_config_parses() {
    let path = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/config/revenue.toml"));
    let cfg = AppConfig::load_from(path).expect("config/revenue.toml should parse");

    assert_eq!(cfg.sync.window_days, 30);
    assert_eq!(cfg.sync.strategy_timeout(), Duration::from_secs(180));
    assert_eq!(cfg.http.max_pages, 10);
    assert!(cfg.browser.webdriver_url.is_none());
    assert_eq!(cfg.browser.timeouts().selector, Duration::from_secs(15));
    assert_eq!(cfg.vault.secret_env, "VAULT_MASTER_SECRET");
    assert_eq!(cfg.attribution.threshold, 0.5);
    assert_eq!(cfg.store.database_path, Path::new("data/revenue.db"));
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(AppConfig::load_from(&dir.path().join("nope.toml")).is_err());
}

#[test]
fn endpoints_can_be_overridden() {
    let cfg = AppConfig::from_toml_str(
        r#"
[endpoints]
shopmy_api = "http://127.0.0.1:9999"
"#,
    )
    .unwrap();
    assert_eq!(cfg.endpoints.shopmy_api, "http://127.0.0.1:9999");
    assert!(!cfg.endpoints.ltk_api.is_empty());
}
