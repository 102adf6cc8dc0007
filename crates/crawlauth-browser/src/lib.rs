//! Browser automation capability surface for crawlauth.
//!
//! The authentication subsystem never talks to a concrete automation
//! library. It is written against the traits in this crate:
//! - [`BrowserDriver`] creates isolated browser contexts
//! - [`BrowserContext`] owns cookies, local storage and pages
//! - [`BrowserPage`] navigates and interacts with elements by selector
//!
//! Adapters for Playwright, CDP or WebDriver implement these traits outside
//! of this workspace. The `test-utils` feature provides a scripted in-memory
//! browser for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub mod storage_state;

#[cfg(any(test, feature = "test-utils"))]
pub mod fake;

pub use storage_state::{Cookie, LocalStorageEntry, OriginStorage, SameSite, StorageState};

/// Errors reported by a browser automation backend.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("element '{selector}' unavailable: {message}")]
    Element { selector: String, message: String },

    #[error("browser context is closed")]
    Closed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BrowserError {
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

/// Document readiness milestones a page can be waited on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Load,
    #[default]
    DomContentLoaded,
    NetworkIdle,
}

/// Main-frame response observed at the end of a navigation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NavigationResponse {
    pub status: u16,
    pub url: String,
}

impl NavigationResponse {
    pub fn new(status: u16, url: impl Into<String>) -> Self {
        Self {
            status,
            url: url.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status < 400
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContextOptions {
    /// Snapshot to seed the context with at creation time.
    #[serde(default)]
    pub storage_state: Option<StorageState>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn new_context(&self, options: ContextOptions) -> BrowserResult<Arc<dyn BrowserContext>>;
}

/// An isolated browsing session: its own cookie jar, storage and pages.
#[async_trait]
pub trait BrowserContext: Send + Sync {
    /// Stable identifier, unique per context instance.
    fn id(&self) -> &str;

    async fn new_page(&self) -> BrowserResult<Arc<dyn BrowserPage>>;

    async fn pages(&self) -> Vec<Arc<dyn BrowserPage>>;

    async fn cookies(&self) -> BrowserResult<Vec<Cookie>>;

    async fn add_cookies(&self, cookies: &[Cookie]) -> BrowserResult<()>;

    async fn storage_state(&self) -> BrowserResult<StorageState>;

    async fn close(&self) -> BrowserResult<()>;
}

#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate the main frame. `Ok(None)` means the navigation produced no
    /// network response (same-document navigation, `about:blank`).
    async fn goto(&self, url: &str, timeout: Duration) -> BrowserResult<Option<NavigationResponse>>;

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> BrowserResult<()>;

    async fn url(&self) -> String;

    /// Number of elements currently matching `selector`.
    async fn count(&self, selector: &str) -> BrowserResult<usize>;

    async fn is_visible(&self, selector: &str) -> BrowserResult<bool>;

    async fn fill(&self, selector: &str, value: &str) -> BrowserResult<()>;

    async fn click(&self, selector: &str) -> BrowserResult<()>;

    async fn press(&self, selector: &str, key: &str) -> BrowserResult<()>;

    /// Submit the form matched by `selector` as if the user submitted it.
    async fn submit_form(&self, selector: &str) -> BrowserResult<()>;

    /// Write entries into the current origin's `localStorage`.
    async fn set_local_storage(&self, entries: &[LocalStorageEntry]) -> BrowserResult<()>;

    async fn close(&self) -> BrowserResult<()>;
}

/// Reduce a URL to scheme, host, port and path. Query and fragment are
/// dropped. Unparseable input is returned trimmed of its query string.
pub fn url_without_query(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

/// Path component of a URL, or the raw input when it does not parse.
pub fn url_path(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => raw.to_string(),
    }
}
