//! Session expiry detection and bounded re-authentication accounting.

use crate::config::{ExpiryIndicator, SessionTimeoutConfig};
use crate::detector::exists;
use crate::error::AuthError;
use crawlauth_browser::{BrowserPage, BrowserResult, NavigationResponse, url_without_query};
use dashmap::DashMap;
use std::collections::HashSet;

pub struct SessionManager {
    config: SessionTimeoutConfig,
    expiry_statuses: HashSet<u16>,
    redirect_to_login: bool,
    reauth_attempts: DashMap<String, u32>,
}

impl SessionManager {
    pub fn new(config: SessionTimeoutConfig) -> Self {
        let mut expiry_statuses = HashSet::new();
        let mut redirect_to_login = false;
        for indicator in &config.indicators {
            match indicator {
                ExpiryIndicator::StatusCode { codes } => expiry_statuses.extend(codes),
                ExpiryIndicator::RedirectToLogin => redirect_to_login = true,
                ExpiryIndicator::ElementVisible { .. } => {}
            }
        }

        Self {
            config,
            expiry_statuses,
            redirect_to_login,
            reauth_attempts: DashMap::new(),
        }
    }

    pub fn max_reauth_attempts(&self) -> u32 {
        self.config.max_reauth_attempts
    }

    /// Whether `response` shows the session has lapsed: an expiry status,
    /// or (with `redirect-to-login` configured) landing on the login page.
    pub fn is_session_expired(&self, response: &NavigationResponse, login_url: &str) -> bool {
        if self.expiry_statuses.contains(&response.status) {
            tracing::debug!(status = response.status, url = %response.url, "Expiry status observed");
            return true;
        }

        self.redirect_to_login && url_without_query(&response.url) == url_without_query(login_url)
    }

    /// Whether any `element-visible` expiry indicator currently matches.
    pub async fn check_page_for_expiry(&self, page: &dyn BrowserPage) -> BrowserResult<bool> {
        for indicator in &self.config.indicators {
            if let ExpiryIndicator::ElementVisible { selector } = indicator {
                if exists(page, selector).await? {
                    tracing::debug!(selector, "Expiry element visible");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Count one re-authentication for `role`. Once the bound is reached
    /// the call fails with [`AuthError::SessionExpired`] and the counter is
    /// left unchanged.
    pub fn record_reauth_attempt(&self, role: &str) -> Result<u32, AuthError> {
        let max = self.config.max_reauth_attempts;
        let mut attempts = self.reauth_attempts.entry(role.to_string()).or_insert(0);
        if *attempts >= max {
            tracing::warn!(role, attempts = *attempts, "Re-authentication attempts exhausted");
            return Err(AuthError::SessionExpired {
                role: role.to_string(),
                attempts: *attempts,
            });
        }
        *attempts += 1;
        Ok(*attempts)
    }

    pub fn reset_reauth_counter(&self, role: &str) {
        self.reauth_attempts.remove(role);
    }

    pub fn get_reauth_attempts(&self, role: &str) -> u32 {
        self.reauth_attempts.get(role).map(|a| *a).unwrap_or(0)
    }
}
