//! Decrypted credential payload: session cookies and tokens for one platform.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stored entry: `name -> value`, a full cookie object captured from a browser, or any other
/// JSON scalar (ids and flags some platforms hand out as numbers or booleans).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CredentialValue {
    Cookie(BrowserCookie),
    Plain(String),
    Scalar(serde_json::Value),
}

impl CredentialValue {
    /// Value as sent in a header or cookie. Null renders empty; other scalars as JSON text.
    pub fn text(&self) -> String {
        match self {
            CredentialValue::Plain(v) => v.clone(),
            CredentialValue::Cookie(c) => c.value.clone(),
            CredentialValue::Scalar(serde_json::Value::Null) => String::new(),
            CredentialValue::Scalar(serde_json::Value::String(v)) => v.clone(),
            CredentialValue::Scalar(v) => v.to_string(),
        }
    }
}

/// Cookie in the shape browser contexts accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

const BEARER_KEYS: [&str; 2] = ["api_token", "access_token"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialSet {
    entries: BTreeMap<String, CredentialValue>,
}

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plain(mut self, name: &str, value: &str) -> Self {
        self.insert_plain(name, value);
        self
    }

    pub fn insert_plain(&mut self, name: &str, value: &str) {
        self.entries
            .insert(name.to_string(), CredentialValue::Plain(value.to_string()));
    }

    pub fn insert_cookie(&mut self, cookie: BrowserCookie) {
        self.entries
            .insert(cookie.name.clone(), CredentialValue::Cookie(cookie));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Bearer token, if the set carries an API token rather than only cookies.
    pub fn bearer_token(&self) -> Option<&str> {
        BEARER_KEYS.iter().find_map(|k| match self.entries.get(*k) {
            Some(CredentialValue::Plain(v)) if !v.is_empty() => Some(v.as_str()),
            Some(CredentialValue::Scalar(serde_json::Value::String(v))) if !v.is_empty() => {
                Some(v.as_str())
            }
            _ => None,
        })
    }

    /// `Cookie` header value built from every entry.
    pub fn cookie_header(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| match v {
                CredentialValue::Cookie(c) => format!("{}={}", c.name, c.value),
                other => format!("{k}={}", other.text()),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Cookies for injection into a browser context; entries without a domain get `default_domain`.
    pub fn browser_cookies(&self, default_domain: &str) -> Vec<BrowserCookie> {
        self.entries
            .iter()
            .map(|(k, v)| match v {
                CredentialValue::Cookie(c) => BrowserCookie {
                    name: c.name.clone(),
                    value: c.value.clone(),
                    domain: c
                        .domain
                        .clone()
                        .filter(|d| !d.is_empty())
                        .or_else(|| Some(default_domain.to_string())),
                    path: c.path.clone().or_else(|| Some("/".to_string())),
                },
                other => BrowserCookie {
                    name: k.clone(),
                    value: other.text(),
                    domain: Some(default_domain.to_string()),
                    path: Some("/".to_string()),
                },
            })
            .collect()
    }
}
