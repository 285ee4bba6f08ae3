// tests/common/mod.rs
// Shared fixtures: in-memory vault, scripted strategies and a scripted browser.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use creator_revenue::error::{BrowserError, StrategyError};
use creator_revenue::ingest::browser::{BrowserDriver, BrowserSession, SessionSetup, TableSpec};
use creator_revenue::ingest::fields::{FieldMap, MissingIdPolicy};
use creator_revenue::ingest::types::{AttemptContext, RetrievalStrategy, Retrieved};
use creator_revenue::model::Platform;
use creator_revenue::store::MemoryStore;
use creator_revenue::vault::{CredentialSet, CredentialVault, VaultCipher};

pub const USER: &str = "creator-1";

pub static FIELDS: FieldMap = FieldMap {
    order_id: &["order_id"],
    product_name: &["product"],
    product_category: &[],
    quantity: &["qty"],
    order_amount: &["amount"],
    commission_amount: &["commission"],
    commission_rate: &["rate"],
    order_date: &["date"],
    tracking_id: &["tracking"],
    click_date: &[],
};

pub fn cipher() -> Arc<VaultCipher> {
    Arc::new(VaultCipher::from_key(&[7u8; 32]))
}

pub fn vault(store: &Arc<MemoryStore>) -> CredentialVault {
    CredentialVault::new(store.clone(), cipher())
}

pub fn session_cookies() -> CredentialSet {
    CredentialSet::new()
        .with_plain("session-id", "abc")
        .with_plain("csrf", "xyz")
}

pub async fn linked(platform: Platform) -> (Arc<MemoryStore>, CredentialVault) {
    let store = Arc::new(MemoryStore::new());
    let v = vault(&store);
    v.save(USER, platform, &session_cookies()).await.unwrap();
    (store, v)
}

pub fn row(order_id: &str, commission: &str) -> Value {
    serde_json::json!({
        "order_id": order_id,
        "product": "Linen Duvet Cover",
        "amount": "$100.00",
        "commission": commission,
        "rate": "10%",
        "date": "2024-03-05",
        "qty": "1"
    })
}

type Outcome = Box<dyn Fn() -> Result<Retrieved, StrategyError> + Send + Sync>;

/// Strategy with a scripted outcome that counts its attempts.
pub struct ScriptedStrategy {
    pub name: &'static str,
    pub calls: Arc<AtomicUsize>,
    outcome: Outcome,
    delay: Option<Duration>,
}

impl ScriptedStrategy {
    pub fn rows(name: &'static str, rows: Vec<Value>, policy: MissingIdPolicy) -> Self {
        Self::new(
            name,
            Box::new(move || {
                Ok(Retrieved {
                    rows: rows
                        .iter()
                        .map(|v| match v {
                            Value::Object(m) => Ok(m.clone()),
                            _ => Err(creator_revenue::error::RowError::NotAnObject),
                        })
                        .collect(),
                    fields: &FIELDS,
                    missing_id: policy,
                })
            }),
        )
    }

    pub fn failing(name: &'static str, make: fn() -> StrategyError) -> Self {
        Self::new(name, Box::new(move || Err(make())))
    }

    fn new(name: &'static str, outcome: Outcome) -> Self {
        Self {
            name,
            calls: Arc::new(AtomicUsize::new(0)),
            outcome,
            delay: None,
        }
    }

    pub fn delayed(mut self, d: Duration) -> Self {
        self.delay = Some(d);
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl RetrievalStrategy for ScriptedStrategy {
    async fn attempt(&self, _ctx: &AttemptContext<'_>) -> Result<Retrieved, StrategyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        (self.outcome)()
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// What the scripted browser shows.
#[derive(Clone, Default)]
pub struct Page {
    /// URL reported after navigation; `None` echoes the requested URL.
    pub landed: Option<String>,
    pub ready: bool,
    pub export_csv: Option<String>,
    pub table: Vec<HashMap<String, String>>,
    /// Navigation never completes.
    pub hang: bool,
}

#[derive(Default)]
pub struct Counters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub aborted: AtomicUsize,
    pub cookies_seen: AtomicUsize,
}

impl Counters {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
    pub fn aborted(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }
    /// Every opened session ended by close or abort.
    pub fn all_released(&self) -> bool {
        self.opened() == self.closed() + self.aborted()
    }
}

pub struct FakeBrowser {
    pub page: Page,
    pub counters: Arc<Counters>,
}

impl FakeBrowser {
    pub fn new(page: Page) -> Arc<Self> {
        Arc::new(Self {
            page,
            counters: Arc::new(Counters::default()),
        })
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn open(&self, setup: &SessionSetup) -> Result<Box<dyn BrowserSession>, BrowserError> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.counters
            .cookies_seen
            .fetch_add(setup.cookies.len(), Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            page: self.page.clone(),
            counters: self.counters.clone(),
            done: false,
        }))
    }
}

struct FakeSession {
    page: Page,
    counters: Arc<Counters>,
    done: bool,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<String, BrowserError> {
        if self.page.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(self.page.landed.clone().unwrap_or_else(|| url.to_string()))
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> Result<(), BrowserError> {
        if self.page.ready {
            Ok(())
        } else {
            Err(BrowserError::Timeout(format!("waiting for {selector}")))
        }
    }

    async fn exists(&mut self, _selector: &str) -> Result<bool, BrowserError> {
        Ok(false)
    }

    async fn click(&mut self, _selector: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn fill(&mut self, _selector: &str, _value: &str) -> Result<bool, BrowserError> {
        Ok(true)
    }

    async fn extract_table(
        &mut self,
        _spec: &TableSpec,
    ) -> Result<Vec<HashMap<String, String>>, BrowserError> {
        Ok(self.page.table.clone())
    }

    async fn download(
        &mut self,
        _trigger: &str,
        _timeout: Duration,
    ) -> Result<Option<String>, BrowserError> {
        Ok(self.page.export_csv.clone())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if !self.done {
            self.done = true;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn abort(&mut self) {
        if !self.done {
            self.done = true;
            self.counters.aborted.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub fn cells(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
