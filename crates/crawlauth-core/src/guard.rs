//! Credential guard: the registry of secret values that must never reach
//! any output sink.
//!
//! Every string leaving the subsystem (log lines, event records, error
//! messages, reports) can be passed through [`CredentialGuard::redact`].
//! The guard is shared as `Arc<CredentialGuard>` between the authenticator
//! and the logging layer, so secrets registered after logging started are
//! still scrubbed.

use crate::config::{AuthConfig, AuthMethod};
use crate::error::AuthError;
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use zeroize::Zeroizing;

/// Replacement for every redacted occurrence.
pub const REDACTED: &str = "[REDACTED]";

/// Values shorter than this are too likely to collide with ordinary text.
const MIN_SECRET_LEN: usize = 4;

/// Passes before redaction gives up on a fixpoint and blanks the whole text.
const MAX_REDACTION_PASSES: usize = 8;

#[derive(Default)]
struct GuardState {
    secrets: Vec<Zeroizing<String>>,
    /// Alternation of every secret, longest first. Rebuilt on insert.
    matcher: Option<Regex>,
}

impl GuardState {
    /// On error the matcher is cleared and redaction falls back to
    /// sequential replacement.
    fn rebuild(&mut self) -> Result<(), regex::Error> {
        if self.secrets.is_empty() {
            self.matcher = None;
            return Ok(());
        }

        let pattern = self
            .ordered_secrets()
            .into_iter()
            .map(|secret| regex::escape(secret))
            .collect::<Vec<_>>()
            .join("|");

        match Regex::new(&pattern) {
            Ok(regex) => {
                self.matcher = Some(regex);
                Ok(())
            }
            Err(e) => {
                self.matcher = None;
                Err(e)
            }
        }
    }

    fn redact_once(&self, text: &str) -> String {
        if let Some(matcher) = &self.matcher {
            return matcher.replace_all(text, REDACTED).into_owned();
        }

        let mut output = text.to_string();
        for secret in self.ordered_secrets() {
            output = output.replace(secret, REDACTED);
        }
        output
    }

    fn contains_secret(&self, text: &str) -> bool {
        match &self.matcher {
            Some(matcher) => matcher.is_match(text),
            None => self.secrets.iter().any(|s| text.contains(s.as_str())),
        }
    }

    fn ordered_secrets(&self) -> Vec<&str> {
        let mut ordered: Vec<&str> = self.secrets.iter().map(|s| s.as_str()).collect();
        ordered.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        ordered
    }
}

#[derive(Default)]
pub struct CredentialGuard {
    state: RwLock<GuardState>,
}

impl std::fmt::Debug for CredentialGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialGuard")
            .field("secrets", &self.secret_count())
            .finish()
    }
}

impl CredentialGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a guard seeded from the environment, see
    /// [`CredentialGuard::seed_from_config`].
    pub fn from_config(config: &AuthConfig) -> Self {
        let guard = Self::new();
        guard.seed_from_config(config);
        guard
    }

    /// Register every credential value currently present in the environment
    /// for the configured roles. Missing variables are skipped; they surface
    /// later as `CredentialsNotFound`.
    pub fn seed_from_config(&self, config: &AuthConfig) {
        for role in &config.roles {
            let mut vars = vec![
                role.credentials.identifier_env.as_str(),
                role.credentials.secret_env.as_str(),
            ];
            match &role.auth_method {
                AuthMethod::TokenInjection { token_env_var, .. } => {
                    vars.push(token_env_var.as_str())
                }
                AuthMethod::CookieInjection { cookies_env_var } => {
                    if let Ok(raw) = std::env::var(cookies_env_var) {
                        self.add_secrets(cookie_values(&raw));
                    }
                    vars.push(cookies_env_var.as_str());
                }
                _ => {}
            }

            for var in vars {
                if let Ok(value) = std::env::var(var) {
                    self.add_secret(&value);
                }
            }
        }
        tracing::debug!(secrets = self.secret_count(), "Credential guard seeded");
    }

    /// Register one secret. Blank and very short values are ignored, as are
    /// values that occur inside [`REDACTED`] itself.
    pub fn add_secret(&self, value: &str) {
        if value.trim().is_empty()
            || value.chars().count() < MIN_SECRET_LEN
            || REDACTED.contains(value)
        {
            return;
        }

        let rebuilt = {
            let mut state = self.state.write();
            if state.secrets.iter().any(|known| known.as_str() == value) {
                return;
            }
            state.secrets.push(Zeroizing::new(value.to_string()));
            state.rebuild()
        };
        // Logged after the lock is released: the log writer redacts through
        // this guard.
        if let Err(e) = rebuilt {
            tracing::warn!(error = %e, "Secret matcher too large, using sequential redaction");
        }
    }

    pub fn add_secrets<I, S>(&self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for value in values {
            self.add_secret(value.as_ref());
        }
    }

    pub fn secret_count(&self) -> usize {
        self.state.read().secrets.len()
    }

    /// Replace every occurrence of every registered secret with
    /// [`REDACTED`]. Longer secrets win over secrets they contain.
    ///
    /// A placeholder next to surrounding text can spell another secret, so
    /// passes repeat until nothing matches. If that takes too long the whole
    /// text is replaced.
    pub fn redact(&self, text: &str) -> String {
        let state = self.state.read();
        let mut output = state.redact_once(text);
        for _ in 1..MAX_REDACTION_PASSES {
            if !state.contains_secret(&output) {
                return output;
            }
            output = state.redact_once(&output);
        }
        if state.contains_secret(&output) {
            return REDACTED.to_string();
        }
        output
    }

    pub fn contains_secret(&self, text: &str) -> bool {
        self.state.read().contains_secret(text)
    }

    /// Fail with [`AuthError::CredentialLeak`] if `output` contains any
    /// registered secret. Only the location is reported.
    pub fn validate_no_leaks(&self, output: &str, location: &str) -> Result<(), AuthError> {
        if self.contains_secret(output) {
            tracing::error!(location, "Credential leak detected");
            return Err(AuthError::CredentialLeak {
                location: location.to_string(),
            });
        }
        Ok(())
    }

    /// Redact every string inside a JSON document. Object keys are redacted
    /// too, since some sinks echo header maps keyed by value.
    pub fn redact_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.redact(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (self.redact(k), self.redact_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    pub fn redact_serializable<T: Serialize>(&self, value: &T) -> serde_json::Result<Value> {
        let value = serde_json::to_value(value)?;
        Ok(self.redact_value(&value))
    }
}

/// Cookie `value` fields of a JSON cookie array. Anything unparseable yields
/// nothing; the raw blob is registered separately.
fn cookie_values(raw: &str) -> Vec<String> {
    let Ok(Value::Array(cookies)) = serde_json::from_str::<Value>(raw) else {
        return Vec::new();
    };
    cookies
        .iter()
        .filter_map(|cookie| cookie.get("value").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// [`MakeWriter`] that scrubs every formatted event before it reaches the
/// wrapped writer.
pub struct RedactingMakeWriter<M> {
    inner: M,
    guard: Arc<CredentialGuard>,
}

impl<M> RedactingMakeWriter<M> {
    pub fn new(inner: M, guard: Arc<CredentialGuard>) -> Self {
        Self { inner, guard }
    }
}

impl<'a, M> MakeWriter<'a> for RedactingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = RedactingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: self.inner.make_writer(),
            guard: self.guard.clone(),
            buffer: Vec::new(),
        }
    }
}

/// Buffers one event and writes its redacted form on flush or drop.
pub struct RedactingWriter<W: Write> {
    inner: W,
    guard: Arc<CredentialGuard>,
    buffer: Vec<u8>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            let text = String::from_utf8_lossy(&self.buffer);
            let redacted = self.guard.redact(&text);
            self.buffer.clear();
            self.inner.write_all(redacted.as_bytes())?;
        }
        self.inner.flush()
    }
}

impl<W: Write> Drop for RedactingWriter<W> {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
