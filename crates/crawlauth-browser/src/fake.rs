//! Scripted in-memory browser for tests.
//!
//! A [`FakeSite`] describes which URLs exist, which selectors each page
//! exposes, which HTTP statuses successive navigations return, and how the
//! login form reacts to a submission. [`FakeBrowser`] serves that site
//! through the capability traits and records what the code under test did.

use crate::{
    BrowserContext, BrowserDriver, BrowserError, BrowserPage, BrowserResult, ContextOptions,
    Cookie, LoadState, LocalStorageEntry, NavigationResponse, OriginStorage, StorageState,
    url_without_query,
};
use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct FakeRoute {
    statuses: VecDeque<u16>,
    final_status: u16,
    elements: HashSet<String>,
    hang: bool,
    unreachable: bool,
}

impl Default for FakeRoute {
    fn default() -> Self {
        Self {
            statuses: VecDeque::new(),
            final_status: 200,
            elements: HashSet::new(),
            hang: false,
            unreachable: false,
        }
    }
}

/// How the site reacts when a form is submitted.
#[derive(Debug, Clone)]
pub struct FakeLogin {
    /// Value that must have been typed into some field, if any.
    pub identifier: Option<String>,
    /// Value that must have been typed into some field, if any.
    pub secret: Option<String>,
    pub redirect_to: String,
    pub cookies: Vec<Cookie>,
}

impl FakeLogin {
    pub fn redirect(redirect_to: impl Into<String>) -> Self {
        Self {
            identifier: None,
            secret: None,
            redirect_to: redirect_to.into(),
            cookies: Vec::new(),
        }
    }

    pub fn expecting(mut self, identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self.secret = Some(secret.into());
        self
    }

    pub fn setting_cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    routes: HashMap<String, FakeRoute>,
    login: Option<FakeLogin>,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page that answers 200 and exposes `selectors`.
    pub fn page(mut self, url: &str, selectors: &[&str]) -> Self {
        let route = self.routes.entry(url_without_query(url)).or_default();
        route
            .elements
            .extend(selectors.iter().map(|s| s.to_string()));
        self
    }

    /// Queue statuses returned by successive navigations before the page
    /// settles on 200.
    pub fn statuses(mut self, url: &str, statuses: &[u16]) -> Self {
        let route = self.routes.entry(url_without_query(url)).or_default();
        route.statuses.extend(statuses.iter().copied());
        self
    }

    /// Every navigation answers `status`.
    pub fn always(mut self, url: &str, status: u16) -> Self {
        let route = self.routes.entry(url_without_query(url)).or_default();
        route.final_status = status;
        self
    }

    /// Navigations never complete; the page reports a timeout.
    pub fn hang(mut self, url: &str) -> Self {
        self.routes.entry(url_without_query(url)).or_default().hang = true;
        self
    }

    /// Navigations fail at the network layer.
    pub fn unreachable(mut self, url: &str) -> Self {
        self.routes
            .entry(url_without_query(url))
            .or_default()
            .unreachable = true;
        self
    }

    pub fn on_login(mut self, login: FakeLogin) -> Self {
        self.login = Some(login);
        self
    }
}

struct Shared {
    site: Mutex<FakeSite>,
    navigations: Mutex<Vec<(String, Option<u16>)>>,
}

/// In-memory [`BrowserDriver`].
pub struct FakeBrowser {
    shared: Arc<Shared>,
    contexts: Mutex<Vec<Arc<FakeContext>>>,
    fail_new_context: AtomicBool,
}

impl FakeBrowser {
    pub fn new(site: FakeSite) -> Self {
        Self {
            shared: Arc::new(Shared {
                site: Mutex::new(site),
                navigations: Mutex::new(Vec::new()),
            }),
            contexts: Mutex::new(Vec::new()),
            fail_new_context: AtomicBool::new(false),
        }
    }

    /// Every context created so far, in creation order.
    pub fn contexts(&self) -> Vec<Arc<FakeContext>> {
        self.contexts.lock().clone()
    }

    pub fn context_count(&self) -> usize {
        self.contexts.lock().len()
    }

    /// `(url, status)` for every navigation attempt; `None` when the attempt
    /// failed before a response.
    pub fn navigations(&self) -> Vec<(String, Option<u16>)> {
        self.shared.navigations.lock().clone()
    }

    pub fn fail_new_context(&self, fail: bool) {
        self.fail_new_context.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn new_context(&self, options: ContextOptions) -> BrowserResult<Arc<dyn BrowserContext>> {
        if self.fail_new_context.load(Ordering::SeqCst) {
            return Err(BrowserError::Other(anyhow!("browser process crashed")));
        }

        let context = Arc::new(FakeContext::new(self.shared.clone()));
        if let Some(state) = options.storage_state {
            context.state.cookies.lock().extend(state.cookies);
            let mut storage = context.state.local_storage.lock();
            for origin in state.origins {
                storage
                    .entry(origin.origin)
                    .or_default()
                    .extend(origin.local_storage);
            }
        }

        self.contexts.lock().push(context.clone());
        Ok(context as Arc<dyn BrowserContext>)
    }
}

struct ContextState {
    shared: Arc<Shared>,
    cookies: Mutex<Vec<Cookie>>,
    local_storage: Mutex<HashMap<String, Vec<LocalStorageEntry>>>,
    closed: AtomicBool,
}

impl ContextState {
    fn ensure_open(&self) -> BrowserResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::Closed);
        }
        Ok(())
    }
}

pub struct FakeContext {
    id: String,
    state: Arc<ContextState>,
    pages: Mutex<Vec<Arc<FakePage>>>,
    close_calls: AtomicUsize,
    fail_close: AtomicBool,
}

impl FakeContext {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            state: Arc::new(ContextState {
                shared,
                cookies: Mutex::new(Vec::new()),
                local_storage: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
            pages: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
            fail_close: AtomicBool::new(false),
        }
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn fake_pages(&self) -> Vec<Arc<FakePage>> {
        self.pages.lock().clone()
    }

    pub fn local_storage(&self, origin: &str) -> Vec<LocalStorageEntry> {
        self.state
            .local_storage
            .lock()
            .get(origin)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_cookies(&self, cookies: Vec<Cookie>) {
        *self.state.cookies.lock() = cookies;
    }
}

#[async_trait]
impl BrowserContext for FakeContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_page(&self) -> BrowserResult<Arc<dyn BrowserPage>> {
        self.state.ensure_open()?;
        let page = Arc::new(FakePage::new(self.state.clone()));
        self.pages.lock().push(page.clone());
        Ok(page as Arc<dyn BrowserPage>)
    }

    async fn pages(&self) -> Vec<Arc<dyn BrowserPage>> {
        self.pages
            .lock()
            .iter()
            .filter(|page| !page.closed.load(Ordering::SeqCst))
            .map(|page| page.clone() as Arc<dyn BrowserPage>)
            .collect()
    }

    async fn cookies(&self) -> BrowserResult<Vec<Cookie>> {
        self.state.ensure_open()?;
        Ok(self.state.cookies.lock().clone())
    }

    async fn add_cookies(&self, cookies: &[Cookie]) -> BrowserResult<()> {
        self.state.ensure_open()?;
        self.state.cookies.lock().extend_from_slice(cookies);
        Ok(())
    }

    async fn storage_state(&self) -> BrowserResult<StorageState> {
        self.state.ensure_open()?;
        let cookies = self.state.cookies.lock().clone();
        let mut origins: Vec<OriginStorage> = self
            .state
            .local_storage
            .lock()
            .iter()
            .map(|(origin, entries)| OriginStorage {
                origin: origin.clone(),
                local_storage: entries.clone(),
            })
            .collect();
        origins.sort_by(|a, b| a.origin.cmp(&b.origin));
        Ok(StorageState { cookies, origins })
    }

    async fn close(&self) -> BrowserResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.state.closed.store(true, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(BrowserError::Other(anyhow!("context close failed")));
        }
        Ok(())
    }
}

pub struct FakePage {
    state: Arc<ContextState>,
    current_url: Mutex<String>,
    filled: Mutex<Vec<(String, String)>>,
    submissions: AtomicUsize,
    closed: AtomicBool,
}

impl FakePage {
    fn new(state: Arc<ContextState>) -> Self {
        Self {
            state,
            current_url: Mutex::new("about:blank".to_string()),
            filled: Mutex::new(Vec::new()),
            submissions: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// `(selector, value)` pairs in fill order.
    pub fn filled(&self) -> Vec<(String, String)> {
        self.filled.lock().clone()
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn current_url(&self) -> String {
        self.current_url.lock().clone()
    }

    fn has_element(&self, selector: &str) -> bool {
        let url = url_without_query(&self.current_url.lock());
        let site = self.state.shared.site.lock();
        site.routes
            .get(&url)
            .is_some_and(|route| route.elements.contains(selector))
    }

    fn require_element(&self, selector: &str) -> BrowserResult<()> {
        self.state.ensure_open()?;
        if !self.has_element(selector) {
            return Err(BrowserError::Element {
                selector: selector.to_string(),
                message: "no element matches selector".to_string(),
            });
        }
        Ok(())
    }

    fn submit(&self) {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let login = self.state.shared.site.lock().login.clone();
        let Some(login) = login else {
            return;
        };

        let filled = self.filled.lock().clone();
        let typed = |expected: &Option<String>| match expected {
            Some(value) => filled.iter().any(|(_, v)| v == value),
            None => true,
        };
        if !typed(&login.identifier) || !typed(&login.secret) {
            return;
        }

        *self.current_url.lock() = login.redirect_to.clone();
        self.state.cookies.lock().extend(login.cookies);
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, url: &str, timeout: Duration) -> BrowserResult<Option<NavigationResponse>> {
        self.state.ensure_open()?;
        let key = url_without_query(url);

        let outcome = {
            let mut site = self.state.shared.site.lock();
            match site.routes.get_mut(&key) {
                None => Err(false),
                Some(route) if route.unreachable => Err(false),
                Some(route) if route.hang => Err(true),
                Some(route) => Ok(route.statuses.pop_front().unwrap_or(route.final_status)),
            }
        };

        match outcome {
            Ok(status) => {
                self.state
                    .shared
                    .navigations
                    .lock()
                    .push((url.to_string(), Some(status)));
                *self.current_url.lock() = url.to_string();
                Ok(Some(NavigationResponse::new(status, url)))
            }
            Err(hang) => {
                self.state
                    .shared
                    .navigations
                    .lock()
                    .push((url.to_string(), None));
                if hang {
                    tokio::time::sleep(timeout).await;
                    Err(BrowserError::timeout(format!("goto {url}"), timeout))
                } else {
                    Err(BrowserError::Navigation(format!(
                        "net::ERR_NAME_NOT_RESOLVED at {url}"
                    )))
                }
            }
        }
    }

    async fn wait_for_load_state(&self, _state: LoadState, _timeout: Duration) -> BrowserResult<()> {
        self.state.ensure_open()
    }

    async fn url(&self) -> String {
        self.current_url.lock().clone()
    }

    async fn count(&self, selector: &str) -> BrowserResult<usize> {
        self.state.ensure_open()?;
        Ok(usize::from(self.has_element(selector)))
    }

    async fn is_visible(&self, selector: &str) -> BrowserResult<bool> {
        self.state.ensure_open()?;
        Ok(self.has_element(selector))
    }

    async fn fill(&self, selector: &str, value: &str) -> BrowserResult<()> {
        self.require_element(selector)?;
        self.filled
            .lock()
            .push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn click(&self, selector: &str) -> BrowserResult<()> {
        self.require_element(selector)?;
        self.submit();
        Ok(())
    }

    async fn press(&self, selector: &str, key: &str) -> BrowserResult<()> {
        self.require_element(selector)?;
        if key == "Enter" {
            self.submit();
        }
        Ok(())
    }

    async fn submit_form(&self, selector: &str) -> BrowserResult<()> {
        self.require_element(selector)?;
        self.submit();
        Ok(())
    }

    async fn set_local_storage(&self, entries: &[LocalStorageEntry]) -> BrowserResult<()> {
        self.state.ensure_open()?;
        let current = self.current_url.lock().clone();
        let origin = url::Url::parse(&current)
            .map(|parsed| parsed.origin().ascii_serialization())
            .map_err(|e| BrowserError::Navigation(format!("no origin for {current}: {e}")))?;
        self.state
            .local_storage
            .lock()
            .entry(origin)
            .or_default()
            .extend_from_slice(entries);
        Ok(())
    }

    async fn close(&self) -> BrowserResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
