// src/ingest/webdriver.rs
//! [`BrowserDriver`] over the W3C WebDriver wire protocol (chromedriver, selenium).
//!
//! Each session gets its own download directory so concurrent exports never see each
//! other's files.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::BrowserConfig;
use crate::error::BrowserError;
use crate::ingest::browser::{BrowserDriver, BrowserSession, SessionSetup, TableSpec};

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const PARTIAL_SUFFIXES: &[&str] = &[".crdownload", ".part", ".tmp"];

pub struct WebDriverBrowser {
    client: reqwest::Client,
    base_url: String,
    headless: bool,
    user_agent: String,
    download_root: PathBuf,
    navigation_timeout: Duration,
}

impl WebDriverBrowser {
    pub fn new(base_url: &str, cfg: &BrowserConfig, user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            headless: cfg.headless,
            user_agent: user_agent.to_string(),
            download_root: cfg.download_dir.clone(),
            navigation_timeout: Duration::from_secs(cfg.navigation_timeout_secs),
        })
    }

    fn capabilities(&self, download_dir: &Path) -> Value {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            format!("--user-agent={}", self.user_agent),
        ];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "acceptInsecureCerts": false,
                    "goog:chromeOptions": {
                        "args": args,
                        "prefs": {
                            "download.default_directory": download_dir.to_string_lossy(),
                            "download.prompt_for_download": false,
                            "download.directory_upgrade": true
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl BrowserDriver for WebDriverBrowser {
    async fn open(&self, setup: &SessionSetup) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let download_dir = self.download_root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&download_dir)
            .await
            .map_err(|e| BrowserError::Driver(format!("download dir: {e}")))?;

        let created = call(
            &self.client,
            Method::POST,
            &format!("{}/session", self.base_url),
            Some(self.capabilities(&download_dir)),
        )
        .await;
        let created = match created {
            Ok(v) => v,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&download_dir);
                return Err(e);
            }
        };
        let Some(session_id) = created.get("sessionId").and_then(Value::as_str) else {
            let _ = std::fs::remove_dir_all(&download_dir);
            return Err(BrowserError::Driver("new session response without id".into()));
        };

        let mut session = WebDriverSession {
            client: self.client.clone(),
            url: format!("{}/session/{}", self.base_url, session_id),
            download_dir,
            closed: false,
        };
        debug!(session = session_id, "webdriver session opened");

        if let Err(e) = session.inject_cookies(setup, self.navigation_timeout).await {
            if let Err(close_err) = session.close().await {
                warn!(error = %close_err, "session teardown after failed setup");
                session.abort();
            }
            return Err(e);
        }
        Ok(Box::new(session))
    }
}

struct WebDriverSession {
    client: reqwest::Client,
    /// `{base}/session/{id}`
    url: String,
    download_dir: PathBuf,
    closed: bool,
}

async fn call(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, BrowserError> {
    let mut req = client.request(method, url);
    if let Some(b) = body {
        req = req.json(&b);
    }
    let resp = req.send().await.map_err(|e| {
        if e.is_timeout() {
            BrowserError::Timeout(e.to_string())
        } else {
            BrowserError::Driver(e.to_string())
        }
    })?;
    let status = resp.status();
    let body: Value = resp
        .json()
        .await
        .map_err(|e| BrowserError::Driver(format!("undecodable driver response: {e}")))?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(value);
    }

    let kind = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Err(match kind {
        "timeout" | "script timeout" => BrowserError::Timeout(message),
        "no such element" => BrowserError::ElementMissing(message),
        _ => BrowserError::Driver(format!("{kind}: {message}")),
    })
}

fn element_ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|e| e.get(ELEMENT_KEY).and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn is_partial(name: &str) -> bool {
    PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s))
}

async fn list_files(dir: &Path) -> Result<HashSet<String>, BrowserError> {
    let mut out = HashSet::new();
    let mut rd = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| BrowserError::Driver(format!("download dir: {e}")))?;
    while let Ok(Some(entry)) = rd.next_entry().await {
        out.insert(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(out)
}

impl WebDriverSession {
    async fn cmd(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, BrowserError> {
        call(&self.client, method, &format!("{}{}", self.url, path), body).await
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<String>, BrowserError> {
        let v = self
            .cmd(
                Method::POST,
                "/elements",
                Some(json!({"using": "css selector", "value": selector})),
            )
            .await?;
        Ok(element_ids(&v))
    }

    async fn find_first(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        Ok(self.find_all(selector).await?.into_iter().next())
    }

    async fn child_text(
        &self,
        parent: &str,
        selector: &str,
    ) -> Result<Option<String>, BrowserError> {
        let v = self
            .cmd(
                Method::POST,
                &format!("/element/{parent}/elements"),
                Some(json!({"using": "css selector", "value": selector})),
            )
            .await?;
        let Some(child) = element_ids(&v).into_iter().next() else {
            return Ok(None);
        };
        let text = self
            .cmd(Method::GET, &format!("/element/{child}/text"), None)
            .await?;
        Ok(text.as_str().map(|s| s.trim().to_string()))
    }

    async fn inject_cookies(
        &mut self,
        setup: &SessionSetup,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        if setup.cookies.is_empty() {
            return Ok(());
        }
        // Cookies can only be set for the domain of the current page.
        self.navigate(&setup.origin, timeout).await?;
        let mut rejected = 0usize;
        for c in &setup.cookies {
            let mut cookie = json!({"name": c.name, "value": c.value});
            if let Some(d) = &c.domain {
                cookie["domain"] = json!(d);
            }
            if let Some(p) = &c.path {
                cookie["path"] = json!(p);
            }
            if self
                .cmd(Method::POST, "/cookie", Some(json!({ "cookie": cookie })))
                .await
                .is_err()
            {
                rejected += 1;
            }
        }
        if rejected > 0 {
            warn!(rejected, total = setup.cookies.len(), "browser rejected some cookies");
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<String, BrowserError> {
        let ms = timeout.as_millis() as u64;
        self.cmd(Method::POST, "/timeouts", Some(json!({"pageLoad": ms})))
            .await?;
        match tokio::time::timeout(
            timeout + Duration::from_secs(2),
            self.cmd(Method::POST, "/url", Some(json!({"url": url}))),
        )
        .await
        {
            Ok(r) => {
                r?;
            }
            Err(_) => return Err(BrowserError::Timeout(format!("navigating to {url}"))),
        }
        let landed = self.cmd(Method::GET, "/url", None).await?;
        Ok(landed.as_str().unwrap_or(url).to_string())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.find_all(selector).await?.is_empty() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout(format!("waiting for {selector}")));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn exists(&mut self, selector: &str) -> Result<bool, BrowserError> {
        Ok(!self.find_all(selector).await?.is_empty())
    }

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        let id = self
            .find_first(selector)
            .await?
            .ok_or_else(|| BrowserError::ElementMissing(selector.to_string()))?;
        self.cmd(Method::POST, &format!("/element/{id}/click"), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<bool, BrowserError> {
        let Some(id) = self.find_first(selector).await? else {
            return Ok(false);
        };
        self.cmd(Method::POST, &format!("/element/{id}/clear"), Some(json!({})))
            .await?;
        self.cmd(
            Method::POST,
            &format!("/element/{id}/value"),
            Some(json!({ "text": value })),
        )
        .await?;
        Ok(true)
    }

    async fn extract_table(
        &mut self,
        spec: &TableSpec,
    ) -> Result<Vec<HashMap<String, String>>, BrowserError> {
        let rows = self.find_all(spec.row_selector).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut cells = HashMap::new();
            for (name, selector) in spec.columns {
                if let Some(text) = self.child_text(&row, selector).await? {
                    if !text.is_empty() {
                        cells.insert((*name).to_string(), text);
                    }
                }
            }
            out.push(cells);
        }
        Ok(out)
    }

    async fn download(
        &mut self,
        trigger_selector: &str,
        timeout: Duration,
    ) -> Result<Option<String>, BrowserError> {
        let Some(trigger) = self.find_first(trigger_selector).await? else {
            return Ok(None);
        };
        let before = list_files(&self.download_dir).await?;
        self.cmd(Method::POST, &format!("/element/{trigger}/click"), Some(json!({})))
            .await?;

        let deadline = Instant::now() + timeout;
        loop {
            let now = list_files(&self.download_dir).await?;
            if let Some(name) = now.iter().find(|n| !before.contains(*n) && !is_partial(n)) {
                let bytes = tokio::fs::read(self.download_dir.join(name))
                    .await
                    .map_err(|e| BrowserError::Driver(format!("reading download: {e}")))?;
                return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout("waiting for export download".into()));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if self.closed {
            return Ok(());
        }
        // stays open until the driver confirms, so a cancelled close still aborts
        call(&self.client, Method::DELETE, &self.url, None).await?;
        self.closed = true;
        let _ = tokio::fs::remove_dir_all(&self.download_dir).await;
        Ok(())
    }

    fn abort(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = std::fs::remove_dir_all(&self.download_dir);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let client = self.client.clone();
                let url = self.url.clone();
                handle.spawn(async move {
                    if let Err(e) = client.delete(&url).send().await {
                        warn!(error = %e, "webdriver session delete failed");
                    }
                });
            }
            Err(_) => warn!(session = %self.url, "no runtime to delete webdriver session"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_ids_read_w3c_references() {
        let v = json!([
            {"element-6066-11e4-a52e-4f735466cecf": "a"},
            {"other": 1},
            {"element-6066-11e4-a52e-4f735466cecf": "b"}
        ]);
        assert_eq!(element_ids(&v), vec!["a".to_string(), "b".to_string()]);
        assert!(element_ids(&Value::Null).is_empty());
    }

    fn session_on(server: &wiremock::MockServer, dir: PathBuf) -> WebDriverSession {
        WebDriverSession {
            client: reqwest::Client::new(),
            url: format!("{}/session/abc", server.uri()),
            download_dir: dir,
            closed: false,
        }
    }

    async fn deletes(server: &wiremock::MockServer) -> usize {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == "DELETE")
            .count()
    }

    #[tokio::test]
    async fn interrupted_close_leaves_session_for_abort() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/session/abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"value": null}))
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_on(&server, dir.path().join("dl"));

        let cut = tokio::time::timeout(Duration::from_millis(50), session.close()).await;
        assert!(cut.is_err());
        assert!(!session.closed);

        session.abort();
        assert!(session.closed);
        sleep(Duration::from_millis(600)).await;
        assert_eq!(deletes(&server).await, 2);
    }

    #[tokio::test]
    async fn completed_close_makes_abort_a_no_op() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": null})))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_on(&server, dir.path().join("dl"));

        session.close().await.unwrap();
        assert!(session.closed);
        session.abort();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(deletes(&server).await, 1);
    }

    #[test]
    fn partial_downloads_are_ignored() {
        assert!(is_partial("report.csv.crdownload"));
        assert!(!is_partial("report.csv"));
    }
}
