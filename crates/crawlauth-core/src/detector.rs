//! Heuristic login form detection and post-submit success checks.

use crate::config::{LoginConfig, LoginSelectors, SuccessIndicator};
use crawlauth_browser::{BrowserError, BrowserPage, BrowserResult, Cookie, url_path};

/// Candidates per field, most specific first.
const PASSWORD_SELECTORS: &[&str] = &[
    r#"input[type="password"]"#,
    r#"input[name="password"]"#,
    r#"input[name="passwd"]"#,
    r#"input[id="password"]"#,
    r#"input[autocomplete="current-password"]"#,
];

const IDENTIFIER_SELECTORS: &[&str] = &[
    r#"input[type="email"]"#,
    r#"input[name="email"]"#,
    r#"input[name="username"]"#,
    r#"input[name="user"]"#,
    r#"input[name="login"]"#,
    r#"input[id="email"]"#,
    r#"input[id="username"]"#,
    r#"input[autocomplete="username"]"#,
    r#"input[autocomplete="email"]"#,
    r#"input[type="text"]"#,
];

const SUBMIT_SELECTORS: &[&str] = &[
    r#"button[type="submit"]"#,
    r#"input[type="submit"]"#,
    r#"button[name="login"]"#,
    r#"button[id*="login"]"#,
    "form button",
];

const FORM_SELECTORS: &[&str] = &[r#"form[action*="login"]"#, r#"form[id*="login"]"#, "form"];

/// Result of an auto-detection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// `None` when no password field was found.
    pub selectors: Option<LoginSelectors>,
    /// Every candidate that was probed, as `"auto-detect <field>: <selector>"`.
    pub attempted: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoginDetector;

impl LoginDetector {
    pub fn new() -> Self {
        Self
    }

    pub async fn detect(&self, page: &dyn BrowserPage) -> BrowserResult<Detection> {
        let mut attempted = Vec::new();

        let password = first_match(page, "password", PASSWORD_SELECTORS, &mut attempted).await?;
        let Some(password) = password else {
            tracing::debug!(candidates = attempted.len(), "No password field detected");
            return Ok(Detection {
                selectors: None,
                attempted,
            });
        };

        let identifier =
            first_match(page, "identifier", IDENTIFIER_SELECTORS, &mut attempted).await?;
        let submit = first_match(page, "submit", SUBMIT_SELECTORS, &mut attempted).await?;
        let form = first_match(page, "form", FORM_SELECTORS, &mut attempted).await?;

        let selectors = LoginSelectors {
            identifier,
            password: Some(password),
            submit,
            form,
        };
        tracing::debug!(?selectors, "Login form detected");
        Ok(Detection {
            selectors: Some(selectors),
            attempted,
        })
    }

    /// Whether a supplied selector set still resolves on `page`. Password is
    /// required; identifier and submit are only checked when given.
    pub async fn validate_selectors(
        &self,
        page: &dyn BrowserPage,
        selectors: &LoginSelectors,
    ) -> BrowserResult<bool> {
        let Some(password) = &selectors.password else {
            return Ok(false);
        };
        if !exists(page, password).await? {
            return Ok(false);
        }

        for selector in [&selectors.identifier, &selectors.submit].into_iter().flatten() {
            if !exists(page, selector).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Page-level success check. Indicators are OR-ed in order. Cookie
    /// indicators need the browser context and always evaluate false here.
    pub async fn check_success(
        &self,
        page: &dyn BrowserPage,
        login: &LoginConfig,
    ) -> BrowserResult<bool> {
        let current = page.url().await;

        if login.success_indicators.is_empty() {
            let left = url_path(&current) != url_path(&login.login_url);
            tracing::debug!(url = %current, left_login_page = left, "No success indicators configured");
            return Ok(left);
        }

        for indicator in &login.success_indicators {
            let passed = match indicator {
                SuccessIndicator::UrlPattern { pattern } => current.contains(pattern.as_str()),
                SuccessIndicator::ElementVisible { selector } => exists(page, selector).await?,
                SuccessIndicator::ElementHidden { selector } => !exists(page, selector).await?,
                SuccessIndicator::CookiePresent { .. } | SuccessIndicator::CookieAbsent { .. } => {
                    false
                }
            };
            if passed {
                tracing::debug!(?indicator, "Success indicator matched");
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Evaluate the cookie-based success indicators against a context's jar.
/// Returns false when none are configured.
pub fn check_cookie_indicators(cookies: &[Cookie], indicators: &[SuccessIndicator]) -> bool {
    let has = |name: &str| cookies.iter().any(|c| c.name == name);
    indicators.iter().any(|indicator| match indicator {
        SuccessIndicator::CookiePresent { name } => has(name),
        SuccessIndicator::CookieAbsent { name } => !has(name),
        _ => false,
    })
}

pub fn has_cookie_indicators(indicators: &[SuccessIndicator]) -> bool {
    indicators.iter().any(|indicator| {
        matches!(
            indicator,
            SuccessIndicator::CookiePresent { .. } | SuccessIndicator::CookieAbsent { .. }
        )
    })
}

async fn first_match(
    page: &dyn BrowserPage,
    field: &str,
    candidates: &[&str],
    attempted: &mut Vec<String>,
) -> BrowserResult<Option<String>> {
    for candidate in candidates {
        attempted.push(format!("auto-detect {field}: {candidate}"));
        if exists(page, candidate).await? {
            return Ok(Some(candidate.to_string()));
        }
    }
    Ok(None)
}

/// A selector the backend rejects counts as absent; anything else (a closed
/// context) propagates.
pub(crate) async fn exists(page: &dyn BrowserPage, selector: &str) -> BrowserResult<bool> {
    match page.count(selector).await {
        Ok(count) => Ok(count > 0),
        Err(BrowserError::Element { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}
