//! Serializable browser storage snapshot.
//!
//! The JSON layout matches what Playwright writes for
//! `context.storageState()`, so snapshots captured by other tooling can be
//! loaded directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Unix timestamp in seconds, `-1` for session cookies.
    #[serde(default = "default_expires")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: SameSite,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_cookie_path(),
            expires: default_expires(),
            http_only: false,
            secure: false,
            same_site: SameSite::default(),
        }
    }
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_expires() -> f64 {
    -1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalStorageEntry {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OriginStorage {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<LocalStorageEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default)]
    pub origins: Vec<OriginStorage>,
}

impl StorageState {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Cheap shape check on an untyped document: a snapshot must carry a
    /// `cookies` list or an `origins` list.
    pub fn has_snapshot_shape(value: &Value) -> bool {
        let Some(object) = value.as_object() else {
            return false;
        };
        object.get("cookies").is_some_and(Value::is_array)
            || object.get("origins").is_some_and(Value::is_array)
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.iter().all(|o| o.local_storage.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_playwright_snapshot() {
        let raw = r#"{
            "cookies": [
                {"name": "sid", "value": "abc123", "domain": "app.example.com", "path": "/",
                 "expires": -1, "httpOnly": true, "secure": true, "sameSite": "Strict"}
            ],
            "origins": [
                {"origin": "https://app.example.com",
                 "localStorage": [{"name": "token", "value": "t0k3n"}]}
            ]
        }"#;

        let state = StorageState::from_json(raw).unwrap();
        assert_eq!(state.cookies.len(), 1);
        assert!(state.cookies[0].http_only);
        assert_eq!(state.cookies[0].same_site, SameSite::Strict);
        assert_eq!(state.origins[0].local_storage[0].name, "token");
        assert!(!state.is_empty());
    }

    #[test]
    fn cookie_defaults_fill_missing_fields() {
        let cookie: Cookie = serde_json::from_value(json!({"name": "a", "value": "b"})).unwrap();
        assert_eq!(cookie.path, "/");
        assert_eq!(cookie.expires, -1.0);
        assert_eq!(cookie.same_site, SameSite::Lax);
    }

    #[test]
    fn snapshot_shape_requires_cookies_or_origins() {
        assert!(StorageState::has_snapshot_shape(&json!({"cookies": []})));
        assert!(StorageState::has_snapshot_shape(&json!({"origins": []})));
        assert!(!StorageState::has_snapshot_shape(&json!({"cookies": "nope"})));
        assert!(!StorageState::has_snapshot_shape(&json!([1, 2])));
        assert!(!StorageState::has_snapshot_shape(&json!({})));
    }
}
