// src/model.rs
//! Canonical records shared by connectors, stores and the attribution engine.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Creator-monetization platforms with a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Amazon,
    Ltk,
    ShopMy,
    Mavely,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Amazon,
        Platform::Ltk,
        Platform::ShopMy,
        Platform::Mavely,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Amazon => "amazon",
            Platform::Ltk => "ltk",
            Platform::ShopMy => "shopmy",
            Platform::Mavely => "mavely",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amazon" => Ok(Platform::Amazon),
            "ltk" => Ok(Platform::Ltk),
            "shopmy" => Ok(Platform::ShopMy),
            "mavely" => Ok(Platform::Mavely),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Health of a stored platform session.
///
/// Transitions:
/// - `Active -> Expired` when a connector sees the session rejected
/// - `Active -> NeedsTwoFactor` on a two-factor challenge (terminal until relink)
/// - any state `-> Invalid` on an unrecoverable auth failure
/// - back to `Active` only through a relink (`CredentialVault::save`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    Expired,
    #[serde(rename = "needs_2fa")]
    NeedsTwoFactor,
    Invalid,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Active => "active",
            CredentialStatus::Expired => "expired",
            CredentialStatus::NeedsTwoFactor => "needs_2fa",
            CredentialStatus::Invalid => "invalid",
        }
    }

    /// Whether a status update (not a relink) may move `self` to `next`.
    /// Re-asserting the current state is always allowed.
    pub fn can_transition_to(self, next: CredentialStatus) -> bool {
        use CredentialStatus::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Active, Expired) | (Active, NeedsTwoFactor) | (_, Invalid)
        )
    }
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for CredentialStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "active" => Ok(CredentialStatus::Active),
            "expired" => Ok(CredentialStatus::Expired),
            "needs_2fa" => Ok(CredentialStatus::NeedsTwoFactor),
            "invalid" => Ok(CredentialStatus::Invalid),
            other => Err(format!("unknown credential status: {other}")),
        }
    }
}

/// Stored credential row. The blob is opaque outside the vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformCredential {
    pub user_id: String,
    pub platform: Platform,
    pub encrypted_blob: String,
    pub status: CredentialStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Partial update applied to an existing credential row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialPatch {
    pub status: Option<CredentialStatus>,
    /// `Some(None)` clears the stored error.
    pub last_error: Option<Option<String>>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// One affiliate transaction, normalized. Natural key: (platform, order_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueEvent {
    pub id: Uuid,
    pub user_id: String,
    pub platform: Platform,
    pub order_id: String,
    pub product_name: Option<String>,
    pub product_category: Option<String>,
    pub quantity: i64,
    pub order_amount: f64,
    pub commission_amount: f64,
    pub commission_rate: Option<f64>,
    pub order_date: Option<NaiveDate>,
    pub tracking_id: Option<String>,
    pub click_date: Option<NaiveDate>,
    pub raw_payload: serde_json::Value,
    pub attributed_content_id: Option<String>,
}

/// A post from the creator's content catalog (read-only here).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub user_id: String,
    pub url: Option<String>,
    pub caption: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

pub const ATTRIBUTION_METHOD_FUZZY: &str = "fuzzy_match";

/// Append-only link between a revenue event and the content credited for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionRecord {
    pub content_id: String,
    pub revenue_event_id: Uuid,
    pub confidence: f64,
    pub method: String,
}

impl AttributionRecord {
    pub fn fuzzy(content_id: &str, revenue_event_id: Uuid, confidence: f64) -> Self {
        Self {
            content_id: content_id.to_string(),
            revenue_event_id,
            confidence: confidence.clamp(0.0, 1.0),
            method: ATTRIBUTION_METHOD_FUZZY.to_string(),
        }
    }
}
