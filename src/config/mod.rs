// src/config/mod.rs
//! Runtime configuration loaded from `config/revenue.toml` (or `$REVENUE_CONFIG_PATH`).
//! Every section has defaults so a missing file still yields a usable config.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "REVENUE_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/revenue.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sync: SyncConfig,
    pub http: HttpConfig,
    pub browser: BrowserConfig,
    pub vault: VaultConfig,
    pub attribution: AttributionConfig,
    pub endpoints: Endpoints,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Trailing window in days requested from each platform.
    pub window_days: u32,
    /// Hard deadline for one strategy attempt, in seconds.
    pub strategy_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            strategy_timeout_secs: 180,
        }
    }
}

impl SyncConfig {
    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_secs(self.strategy_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Upper bound on pages fetched from paginated APIs.
    pub max_pages: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 4,
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36"
                .to_string(),
            max_pages: 10,
        }
    }
}

impl HttpConfig {
    /// Shared client for platform APIs.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .context("building http client")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// W3C WebDriver endpoint (e.g. chromedriver). Browser strategies are disabled when unset.
    pub webdriver_url: Option<String>,
    pub headless: bool,
    pub navigation_timeout_secs: u64,
    pub selector_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub download_dir: PathBuf,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: None,
            headless: true,
            navigation_timeout_secs: 30,
            selector_timeout_secs: 15,
            download_timeout_secs: 10,
            download_dir: std::env::temp_dir().join("creator-revenue-downloads"),
        }
    }
}

impl BrowserConfig {
    pub fn timeouts(&self) -> crate::ingest::browser::BrowserTimeouts {
        crate::ingest::browser::BrowserTimeouts {
            navigation: Duration::from_secs(self.navigation_timeout_secs),
            selector: Duration::from_secs(self.selector_timeout_secs),
            download: Duration::from_secs(self.download_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Name of the env var holding the master secret (the secret itself never lives in files).
    pub secret_env: String,
    /// Fixed KDF salt (at least 8 bytes).
    pub salt: String,
    pub kdf_memory_kib: u32,
    pub kdf_iterations: u32,
    pub kdf_parallelism: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            secret_env: "VAULT_MASTER_SECRET".to_string(),
            salt: "creator-revenue-vault".to_string(),
            kdf_memory_kib: 65536,
            kdf_iterations: 3,
            kdf_parallelism: 4,
        }
    }
}

impl VaultConfig {
    pub fn master_secret(&self) -> Result<String> {
        let v = std::env::var(&self.secret_env)
            .map_err(|_| anyhow!("missing {} env var", self.secret_env))?;
        if v.trim().is_empty() {
            return Err(anyhow!("{} is empty", self.secret_env));
        }
        Ok(v)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    /// Minimum confidence for committing a match.
    pub threshold: f64,
    /// Only credit time proximity for sales on or after the post date.
    pub require_sale_after_post: bool,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            require_sale_after_post: false,
        }
    }
}

/// Base URLs per platform; overridable for staging and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub amazon_base: String,
    pub ltk_base: String,
    pub ltk_api: String,
    pub shopmy_base: String,
    pub shopmy_api: String,
    pub mavely_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            amazon_base: "https://affiliate-program.amazon.com".to_string(),
            ltk_base: "https://company.liketoknow.it".to_string(),
            ltk_api: "https://api.liketoknow.it".to_string(),
            shopmy_base: "https://shopmy.us".to_string(),
            shopmy_api: "https://api.shopmy.us".to_string(),
            mavely_base: "https://mavely.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/revenue.db"),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(s).context("parsing revenue config toml")?;
        Ok(cfg.sanitized())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load using env var + fallbacks:
    /// 1) $REVENUE_CONFIG_PATH (must exist)
    /// 2) config/revenue.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        Ok(Self::default())
    }

    fn sanitized(mut self) -> Self {
        if self.sync.window_days == 0 {
            self.sync.window_days = SyncConfig::default().window_days;
        }
        if self.sync.strategy_timeout_secs == 0 {
            self.sync.strategy_timeout_secs = SyncConfig::default().strategy_timeout_secs;
        }
        if !(0.0..=1.0).contains(&self.attribution.threshold) || self.attribution.threshold.is_nan()
        {
            self.attribution.threshold = AttributionConfig::default().threshold;
        }
        if self.http.max_pages == 0 {
            self.http.max_pages = 1;
        }
        if self.vault.salt.len() < 8 {
            // argon2 rejects salts shorter than 8 bytes
            self.vault.salt = VaultConfig::default().salt;
        }
        self
    }
}
