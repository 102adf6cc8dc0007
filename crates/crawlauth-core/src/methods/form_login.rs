//! Interactive login through an HTML form.
//!
//! One call to [`FormLoginMethod::execute`] runs a single attempt through
//! NAVIGATE → LOADED → SELECT → FILL → SUBMIT → VERIFY. Only NAVIGATE is
//! retried; every later step fails the attempt.

use super::backoff::{RetryPolicy, is_retryable_status};
use crate::config::{FormLoginOptions, LoginConfig, LoginSelectors};
use crate::credentials::ResolvedCredentials;
use crate::detector::{LoginDetector, check_cookie_indicators, has_cookie_indicators};
use crate::error::{AuthError, RedactedCause};
use crawlauth_browser::{BrowserContext, BrowserError, BrowserPage, LoadState};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorSource {
    Configured,
    Detected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormLoginOutcome {
    /// Result of the VERIFY step.
    pub success: bool,
    pub navigation_attempts: u32,
    /// Backoff delays slept between navigation attempts, in order.
    pub backoff_delays: Vec<Duration>,
    pub selector_source: SelectorSource,
}

struct Navigation {
    attempts: u32,
    delays: Vec<Duration>,
}

enum Retry {
    Timeout(String),
    Status(u16),
}

impl Retry {
    fn reason(&self) -> String {
        match self {
            Retry::Timeout(message) => message.clone(),
            Retry::Status(status) => format!("HTTP {status}"),
        }
    }
}

pub struct FormLoginMethod {
    detector: LoginDetector,
    options: FormLoginOptions,
    policy: RetryPolicy,
}

impl FormLoginMethod {
    pub fn new(detector: LoginDetector, options: FormLoginOptions) -> Self {
        let policy = RetryPolicy::from_options(&options);
        Self {
            detector,
            options,
            policy,
        }
    }

    /// Run one login attempt in `context`. Error text is scrubbed of the
    /// identifier and secret before it is returned.
    pub async fn execute(
        &self,
        role: &str,
        context: &dyn BrowserContext,
        login: &LoginConfig,
        credentials: &ResolvedCredentials,
    ) -> Result<FormLoginOutcome, AuthError> {
        self.run(role, context, login, credentials)
            .await
            .map_err(|e| e.map_text(|text| credentials.scrub(text)))
    }

    async fn run(
        &self,
        role: &str,
        context: &dyn BrowserContext,
        login: &LoginConfig,
        credentials: &ResolvedCredentials,
    ) -> Result<FormLoginOutcome, AuthError> {
        let page = context
            .new_page()
            .await
            .map_err(|e| browser_failure(role, "opening login page", e))?;
        let page = page.as_ref();

        let navigation = self.navigate(page, &login.login_url).await?;

        page.wait_for_load_state(LoadState::DomContentLoaded, self.options.load_timeout())
            .await
            .map_err(|e| browser_failure(role, "waiting for login page", e))?;

        let (selectors, selector_source) = self.select(role, page, login).await?;
        tracing::debug!(role, ?selector_source, "Login selectors resolved");

        self.fill(role, page, &selectors, credentials).await?;
        self.submit(role, page, &selectors).await?;
        let success = self.verify(role, page, context, login).await?;

        tracing::info!(
            role,
            success,
            attempts = navigation.attempts,
            "Form login attempt finished"
        );
        Ok(FormLoginOutcome {
            success,
            navigation_attempts: navigation.attempts,
            backoff_delays: navigation.delays,
            selector_source,
        })
    }

    async fn navigate(&self, page: &dyn BrowserPage, url: &str) -> Result<Navigation, AuthError> {
        let timeout = self.options.navigation_timeout();
        let mut delays = Vec::new();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let retry = match tokio::time::timeout(timeout, page.goto(url, timeout)).await {
                Err(_) => Retry::Timeout(format!(
                    "navigation timed out after {}ms",
                    timeout.as_millis()
                )),
                Ok(Err(e)) if e.is_timeout() => Retry::Timeout(e.to_string()),
                Ok(Err(e)) => return Err(unreachable(url, e.to_string(), attempts)),
                Ok(Ok(None)) => return Ok(Navigation { attempts, delays }),
                Ok(Ok(Some(response))) => {
                    if response.is_success() {
                        return Ok(Navigation { attempts, delays });
                    }
                    if !is_retryable_status(response.status) {
                        return Err(unreachable(
                            url,
                            format!("HTTP {}", response.status),
                            attempts,
                        ));
                    }
                    Retry::Status(response.status)
                }
            };

            let retries_used = attempts - 1;
            if retries_used >= self.policy.max_retries {
                return Err(unreachable(url, retry.reason(), attempts));
            }

            let delay = self.policy.delay(retries_used);
            tracing::warn!(
                url,
                attempt = attempts,
                reason = %retry.reason(),
                delay_ms = delay.as_millis() as u64,
                "Login page navigation failed, retrying"
            );
            delays.push(delay);
            tokio::time::sleep(delay).await;
        }
    }

    async fn select(
        &self,
        role: &str,
        page: &dyn BrowserPage,
        login: &LoginConfig,
    ) -> Result<(LoginSelectors, SelectorSource), AuthError> {
        let mut attempted = Vec::new();

        if let Some(configured) = &login.selectors {
            attempted.extend(configured.describe("configured"));
            let valid = self
                .detector
                .validate_selectors(page, configured)
                .await
                .map_err(|e| browser_failure(role, "validating configured selectors", e))?;
            if valid {
                return Ok((configured.clone(), SelectorSource::Configured));
            }
            tracing::warn!(role, "Configured login selectors no longer match, auto-detecting");
        }

        let detection = self
            .detector
            .detect(page)
            .await
            .map_err(|e| browser_failure(role, "detecting login form", e))?;
        attempted.extend(detection.attempted);

        match detection.selectors {
            Some(selectors) => Ok((selectors, SelectorSource::Detected)),
            None => Err(AuthError::LoginFormNotFound {
                url: page.url().await,
                attempted,
            }),
        }
    }

    async fn fill(
        &self,
        role: &str,
        page: &dyn BrowserPage,
        selectors: &LoginSelectors,
        credentials: &ResolvedCredentials,
    ) -> Result<(), AuthError> {
        if let Some(identifier) = &selectors.identifier {
            page.fill(identifier, credentials.identifier())
                .await
                .map_err(|e| browser_failure(role, "filling identifier", e))?;
        }

        let Some(password) = &selectors.password else {
            return Err(AuthError::authentication(role, "no password selector resolved"));
        };
        page.fill(password, credentials.secret())
            .await
            .map_err(|e| browser_failure(role, "filling password", e))
    }

    async fn submit(
        &self,
        role: &str,
        page: &dyn BrowserPage,
        selectors: &LoginSelectors,
    ) -> Result<(), AuthError> {
        let result = match (&selectors.submit, &selectors.form, &selectors.password) {
            (Some(submit), _, _) => page.click(submit).await,
            (None, Some(form), _) => page.submit_form(form).await,
            (None, None, Some(password)) => page.press(password, "Enter").await,
            (None, None, None) => {
                return Err(AuthError::authentication(role, "no way to submit the login form"));
            }
        };
        result.map_err(|e| browser_failure(role, "submitting login form", e))
    }

    async fn verify(
        &self,
        role: &str,
        page: &dyn BrowserPage,
        context: &dyn BrowserContext,
        login: &LoginConfig,
    ) -> Result<bool, AuthError> {
        if let Err(e) = page
            .wait_for_load_state(LoadState::NetworkIdle, self.options.load_timeout())
            .await
        {
            tracing::debug!(role, error = %e, "Post-submit load did not settle");
        }
        tokio::time::sleep(self.options.post_submit_grace()).await;

        let page_success = self
            .detector
            .check_success(page, login)
            .await
            .map_err(|e| browser_failure(role, "checking login success", e))?;
        if page_success || !has_cookie_indicators(&login.success_indicators) {
            return Ok(page_success);
        }

        let cookies = context
            .cookies()
            .await
            .map_err(|e| browser_failure(role, "reading cookies", e))?;
        Ok(check_cookie_indicators(&cookies, &login.success_indicators))
    }
}

fn unreachable(url: &str, reason: String, attempts: u32) -> AuthError {
    AuthError::LoginUrlUnreachable {
        url: url.to_string(),
        reason,
        attempts,
    }
}

fn browser_failure(role: &str, step: &str, error: BrowserError) -> AuthError {
    AuthError::Authentication {
        role: role.to_string(),
        message: format!("{step} failed"),
        cause: Some(RedactedCause::new(error.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuccessIndicator;
    use crawlauth_browser::fake::{FakeBrowser, FakeLogin, FakeSite};
    use crawlauth_browser::{BrowserDriver, ContextOptions, Cookie};
    use std::sync::Arc;

    const LOGIN: &str = "https://app.example.com/login";
    const DASHBOARD: &str = "https://app.example.com/dashboard";
    const PASSWORD: &str = r#"input[type="password"]"#;
    const EMAIL: &str = r#"input[type="email"]"#;
    const SUBMIT: &str = r#"button[type="submit"]"#;

    fn login_config() -> LoginConfig {
        LoginConfig {
            login_url: LOGIN.to_string(),
            selectors: None,
            success_indicators: Vec::new(),
        }
    }

    fn credentials() -> ResolvedCredentials {
        ResolvedCredentials::new("alice@example.com", "hunter22-secret")
    }

    fn method() -> FormLoginMethod {
        FormLoginMethod::new(LoginDetector::new(), FormLoginOptions::default())
    }

    async fn context(site: FakeSite) -> (FakeBrowser, Arc<dyn BrowserContext>) {
        let browser = FakeBrowser::new(site);
        let context = browser.new_context(ContextOptions::default()).await.unwrap();
        (browser, context)
    }

    fn login_site() -> FakeSite {
        FakeSite::new()
            .page(LOGIN, &[PASSWORD, EMAIL, SUBMIT])
            .page(DASHBOARD, &[])
            .on_login(FakeLogin::redirect(DASHBOARD).expecting("alice@example.com", "hunter22-secret"))
    }

    #[tokio::test(start_paused = true)]
    async fn detected_form_logs_in() {
        let (browser, context) = context(login_site()).await;
        let outcome = method()
            .execute("admin", context.as_ref(), &login_config(), &credentials())
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.navigation_attempts, 1);
        assert!(outcome.backoff_delays.is_empty());
        assert_eq!(outcome.selector_source, SelectorSource::Detected);

        let page = &browser.contexts()[0].fake_pages()[0];
        assert_eq!(
            page.filled(),
            vec![
                (EMAIL.to_string(), "alice@example.com".to_string()),
                (PASSWORD.to_string(), "hunter22-secret".to_string()),
            ]
        );
        assert_eq!(page.submissions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_configured_selectors_fall_back_to_detection() {
        let (_browser, context) = context(login_site()).await;
        let mut login = login_config();
        login.selectors = Some(LoginSelectors {
            identifier: Some("#old-user".to_string()),
            password: Some("#old-pass".to_string()),
            submit: None,
            form: None,
        });

        let outcome = method()
            .execute("admin", context.as_ref(), &login, &credentials())
            .await
            .unwrap();
        assert_eq!(outcome.selector_source, SelectorSource::Detected);
        assert!(outcome.success);
    }

    #[tokio::test(start_paused = true)]
    async fn password_only_form_submits_with_enter() {
        let site = FakeSite::new()
            .page(LOGIN, &["#pw"])
            .page(DASHBOARD, &[])
            .on_login(FakeLogin::redirect(DASHBOARD));
        let (browser, context) = context(site).await;
        let mut login = login_config();
        login.selectors = Some(LoginSelectors {
            password: Some("#pw".to_string()),
            ..LoginSelectors::default()
        });

        let outcome = method()
            .execute("admin", context.as_ref(), &login, &credentials())
            .await
            .unwrap();
        assert_eq!(outcome.selector_source, SelectorSource::Configured);
        assert!(outcome.success);
        assert_eq!(browser.contexts()[0].fake_pages()[0].submissions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_statuses_back_off_then_give_up() {
        let site = FakeSite::new().page(LOGIN, &[PASSWORD]).always(LOGIN, 502);
        let (browser, context) = context(site).await;

        let err = method()
            .execute("admin", context.as_ref(), &login_config(), &credentials())
            .await
            .unwrap_err();
        match err {
            AuthError::LoginUrlUnreachable {
                attempts, reason, ..
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(reason, "HTTP 502");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(browser.navigations().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_status_fails_immediately() {
        let site = FakeSite::new().page(LOGIN, &[PASSWORD]).always(LOGIN, 404);
        let (browser, context) = context(site).await;

        let err = method()
            .execute("admin", context.as_ref(), &login_config(), &credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::LoginUrlUnreachable { attempts: 1, .. }));
        assert_eq!(browser.navigations().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_timeouts_are_retried() {
        let site = FakeSite::new().hang(LOGIN);
        let (browser, context) = context(site).await;

        let err = method()
            .execute("admin", context.as_ref(), &login_config(), &credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::LoginUrlUnreachable { attempts: 4, .. }));
        assert_eq!(browser.navigations().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_credentials_fail_verification() {
        let site = FakeSite::new()
            .page(LOGIN, &[PASSWORD, EMAIL, SUBMIT])
            .page(DASHBOARD, &[])
            .on_login(FakeLogin::redirect(DASHBOARD).expecting("bob@example.com", "other-secret"));
        let (_browser, context) = context(site).await;

        let outcome = method()
            .execute("admin", context.as_ref(), &login_config(), &credentials())
            .await
            .unwrap();
        assert!(!outcome.success);
    }

    #[tokio::test(start_paused = true)]
    async fn cookie_indicator_is_checked_against_the_context() {
        let site = FakeSite::new()
            .page(LOGIN, &[PASSWORD, SUBMIT])
            .on_login(
                FakeLogin::redirect(LOGIN)
                    .setting_cookie(Cookie::new("sid", "s3ss10n-value", "app.example.com")),
            );
        let (_browser, context) = context(site).await;
        let mut login = login_config();
        login.success_indicators = vec![SuccessIndicator::CookiePresent {
            name: "sid".to_string(),
        }];

        let outcome = method()
            .execute("admin", context.as_ref(), &login, &credentials())
            .await
            .unwrap();
        assert!(outcome.success);
    }

    #[tokio::test(start_paused = true)]
    async fn errors_never_echo_credentials() {
        let site = FakeSite::new().unreachable(LOGIN);
        let (_browser, context) = context(site).await;
        let mut login = login_config();
        login.login_url = format!("{LOGIN}?user=alice@example.com");

        let err = method()
            .execute("admin", context.as_ref(), &login, &credentials())
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(!message.contains("alice@example.com"));
        assert!(message.contains("[IDENTIFIER]"));
    }
}
