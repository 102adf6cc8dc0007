//! Role-based authentication orchestrator.
//!
//! The [`Authenticator`] owns the role → browser context cache, the
//! credential guard, and the append-only event log. Operations on one role
//! are serialized by a per-role async mutex; distinct roles proceed
//! concurrently.

use crate::config::{AuthConfig, AuthMethod, RoleConfig};
use crate::credentials::ResolvedCredentials;
use crate::detector::LoginDetector;
use crate::error::{AuthError, RedactedCause};
use crate::events::{AuthEvent, AuthEventKind};
use crate::guard::CredentialGuard;
use crate::methods::{FormLoginMethod, StorageStateMethod};
use crate::session::SessionManager;
use crawlauth_browser::{BrowserContext, BrowserDriver, ContextOptions, NavigationResponse};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

pub type SessionHandle = Arc<dyn BrowserContext>;

pub struct Authenticator {
    config: AuthConfig,
    driver: Arc<dyn BrowserDriver>,
    guard: Arc<CredentialGuard>,
    form_login: FormLoginMethod,
    storage_state: StorageStateMethod,
    session_manager: SessionManager,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    role_locks: HashMap<String, Arc<tokio::sync::Mutex<()>>>,
    events: Mutex<Vec<AuthEvent>>,
}

impl Authenticator {
    /// Validate `config` and seed a credential guard from the environment.
    pub fn new(config: AuthConfig, driver: Arc<dyn BrowserDriver>) -> Result<Self, AuthError> {
        Self::with_guard(config, driver, Arc::new(CredentialGuard::new()))
    }

    /// Like [`Authenticator::new`] but seeding and sharing an existing guard,
    /// for example one already installed in the logging layer.
    pub fn with_guard(
        config: AuthConfig,
        driver: Arc<dyn BrowserDriver>,
        guard: Arc<CredentialGuard>,
    ) -> Result<Self, AuthError> {
        config.validate()?;
        guard.seed_from_config(&config);

        let role_locks = config
            .roles
            .iter()
            .map(|role| (role.name.clone(), Arc::new(tokio::sync::Mutex::new(()))))
            .collect();

        Ok(Self {
            form_login: FormLoginMethod::new(LoginDetector::new(), config.form_login.clone()),
            storage_state: StorageStateMethod::new(),
            session_manager: SessionManager::new(config.session_timeout.clone()),
            config,
            driver,
            guard,
            sessions: RwLock::new(HashMap::new()),
            role_locks,
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn guard(&self) -> Arc<CredentialGuard> {
        self.guard.clone()
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }

    /// Return the role's live context, logging in first if there is none.
    pub async fn authenticate(&self, role: &str) -> Result<SessionHandle, AuthError> {
        let Some(lock) = self.role_locks.get(role) else {
            let err = AuthError::unknown_role(role);
            self.record(
                AuthEvent::new(AuthEventKind::AuthFailure, role, false).with_error(err.to_string()),
            );
            return Err(err);
        };
        let _held = lock.lock().await;
        self.authenticate_locked(role).await
    }

    /// Authenticate every configured role concurrently. Results are in
    /// configuration order.
    pub async fn authenticate_all(&self) -> Vec<(String, Result<SessionHandle, AuthError>)> {
        let names: Vec<String> = self.config.roles.iter().map(|r| r.name.clone()).collect();
        let results = join_all(names.iter().map(|name| self.authenticate(name))).await;
        names.into_iter().zip(results).collect()
    }

    /// Read both credential variables for `role` and register the values
    /// with the guard.
    pub fn resolve_credentials(&self, role: &str) -> Result<ResolvedCredentials, AuthError> {
        let role_config = self
            .config
            .role(role)
            .ok_or_else(|| AuthError::unknown_role(role))?;
        let credentials = ResolvedCredentials::from_env(role_config)?;
        self.guard
            .add_secrets([credentials.identifier(), credentials.secret()]);
        Ok(credentials)
    }

    /// Discard the cached context (closing it once) and log in again. A
    /// `re-auth` event is recorded whatever the outcome.
    pub async fn re_authenticate(&self, role: &str) -> Result<SessionHandle, AuthError> {
        let started = Instant::now();
        let result = self.re_authenticate_inner(role).await;

        let mut event = AuthEvent::new(AuthEventKind::ReAuth, role, result.is_ok())
            .with_duration_ms(started.elapsed().as_millis() as u64);
        if let Err(e) = &result {
            event = event.with_error(e.to_string());
        }
        self.record(event);
        result
    }

    async fn re_authenticate_inner(&self, role: &str) -> Result<SessionHandle, AuthError> {
        let lock = self
            .role_locks
            .get(role)
            .ok_or_else(|| AuthError::unknown_role(role))?;
        let _held = lock.lock().await;

        let previous = self.sessions.write().remove(role);
        if let Some(previous) = previous {
            if let Err(e) = previous.close().await {
                tracing::warn!(role, error = %self.guard.redact(&e.to_string()), "Failed to close previous context");
            }
        }
        self.authenticate_locked(role).await
    }

    /// Re-authenticate `role` if `response` shows its session expired.
    /// Returns whether a re-authentication happened. Fails with
    /// [`AuthError::SessionExpired`] once the role's budget is spent.
    pub async fn recover_if_expired(
        &self,
        role: &str,
        response: &NavigationResponse,
    ) -> Result<bool, AuthError> {
        if !self
            .session_manager
            .is_session_expired(response, &self.config.login.login_url)
        {
            return Ok(false);
        }

        let attempt = self.session_manager.record_reauth_attempt(role)?;
        tracing::info!(role, attempt, "Session expired, re-authenticating");
        self.re_authenticate(role).await?;
        Ok(true)
    }

    /// Close and forget the role's context. No-op when the role holds no
    /// session.
    pub async fn logout(&self, role: &str) -> Result<(), AuthError> {
        let Some(lock) = self.role_locks.get(role) else {
            return Ok(());
        };
        let _held = lock.lock().await;

        let context = self.sessions.write().remove(role);
        let Some(context) = context else {
            return Ok(());
        };

        match context.close().await {
            Ok(()) => {
                tracing::info!(role, "Logged out");
                self.record(AuthEvent::new(AuthEventKind::Logout, role, true));
                Ok(())
            }
            Err(e) => {
                let err = AuthError::Authentication {
                    role: role.to_string(),
                    message: "closing context on logout failed".to_string(),
                    cause: Some(RedactedCause::new(self.guard.redact(&e.to_string()))),
                };
                self.record(
                    AuthEvent::new(AuthEventKind::Logout, role, false).with_error(err.to_string()),
                );
                Err(err)
            }
        }
    }

    /// Best-effort liveness check: the context still holds cookies. This
    /// does not prove the server considers the session valid.
    pub async fn is_session_valid(&self, role: &str) -> bool {
        let context = self.sessions.read().get(role).cloned();
        let Some(context) = context else {
            return false;
        };
        context
            .cookies()
            .await
            .map(|cookies| !cookies.is_empty())
            .unwrap_or(false)
    }

    /// Capture a role's live session into a storage-state file for later
    /// `storage-state` logins.
    pub async fn save_storage_state(&self, role: &str, path: &Path) -> Result<(), AuthError> {
        let context = self
            .sessions
            .read()
            .get(role)
            .cloned()
            .ok_or_else(|| AuthError::authentication(role, "role has no live session"))?;
        self.storage_state
            .save(context.as_ref(), path)
            .await
            .map_err(|e| e.for_role(role))
    }

    /// Snapshot of the live role → context mapping.
    pub fn contexts(&self) -> HashMap<String, SessionHandle> {
        self.sessions.read().clone()
    }

    /// Copy of the event log with every error message redacted again.
    pub fn auth_events(&self) -> Vec<AuthEvent> {
        self.events
            .lock()
            .iter()
            .map(|event| AuthEvent {
                error: event.error.as_deref().map(|e| self.guard.redact(e)),
                ..event.clone()
            })
            .collect()
    }

    /// Close every cached context. Individual failures are logged and
    /// skipped. Each role's lock is taken first, so a login still in flight
    /// finishes and its context is closed too.
    pub async fn close(&self) {
        for (role, lock) in &self.role_locks {
            let _held = lock.lock().await;
            let context = self.sessions.write().remove(role);
            let Some(context) = context else {
                continue;
            };
            if let Err(e) = context.close().await {
                tracing::warn!(role = %role, error = %self.guard.redact(&e.to_string()), "Failed to close context");
            }
        }
        tracing::debug!("Authenticator closed");
    }

    async fn authenticate_locked(&self, role: &str) -> Result<SessionHandle, AuthError> {
        if let Some(context) = self.sessions.read().get(role).cloned() {
            tracing::debug!(role, "Reusing cached session");
            return Ok(context);
        }

        let role_config = self
            .config
            .role(role)
            .ok_or_else(|| AuthError::unknown_role(role))?;

        let started = Instant::now();
        let result = self
            .login(role_config)
            .await
            .map_err(|e| e.map_text(|text| self.guard.redact(text)));
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(context) => {
                self.sessions
                    .write()
                    .insert(role.to_string(), context.clone());
                tracing::info!(role, method = role_config.auth_method.kind(), duration_ms, "Authenticated");
                self.record(
                    AuthEvent::new(AuthEventKind::Login, role, true).with_duration_ms(duration_ms),
                );
                Ok(context)
            }
            Err(e) => {
                tracing::warn!(role, code = e.code(), error = %e, "Authentication failed");
                self.record(
                    AuthEvent::new(AuthEventKind::AuthFailure, role, false)
                        .with_error(e.to_string())
                        .with_duration_ms(duration_ms),
                );
                Err(e)
            }
        }
    }

    async fn login(&self, role: &RoleConfig) -> Result<SessionHandle, AuthError> {
        let credentials = match &role.auth_method {
            AuthMethod::FormLogin => Some(self.resolve_credentials(&role.name)?),
            AuthMethod::StorageState { .. } => None,
            AuthMethod::CookieInjection { .. }
            | AuthMethod::TokenInjection { .. }
            | AuthMethod::CustomScript { .. } => {
                return Err(AuthError::authentication(
                    &role.name,
                    format!("auth method '{}' is not yet implemented", role.auth_method.kind()),
                ));
            }
        };

        let context = self
            .driver
            .new_context(ContextOptions::default())
            .await
            .map_err(|e| AuthError::Authentication {
                role: role.name.clone(),
                message: "creating browser context failed".to_string(),
                cause: Some(RedactedCause::new(e.to_string())),
            })?;

        let outcome = match (&role.auth_method, &credentials) {
            (AuthMethod::FormLogin, Some(credentials)) => self
                .form_login
                .execute(&role.name, context.as_ref(), &self.config.login, credentials)
                .await
                .and_then(|outcome| {
                    if outcome.success {
                        Ok(())
                    } else {
                        Err(AuthError::authentication(&role.name, "login verification failed"))
                    }
                }),
            (AuthMethod::StorageState { path }, _) => self
                .storage_state
                .apply(context.as_ref(), path)
                .await
                .map_err(|e| e.for_role(&role.name)),
            _ => Err(AuthError::authentication(&role.name, "credentials were not resolved")),
        };

        match outcome {
            Ok(()) => Ok(context),
            Err(e) => {
                if let Err(close_err) = context.close().await {
                    tracing::debug!(role = %role.name, error = %close_err, "Failed to close context after failed login");
                }
                Err(e)
            }
        }
    }

    fn record(&self, event: AuthEvent) {
        let event = AuthEvent {
            error: event.error.as_deref().map(|e| self.guard.redact(e)),
            ..event
        };
        self.events.lock().push(event);
    }
}
