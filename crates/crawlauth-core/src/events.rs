use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthEventKind {
    Login,
    ReAuth,
    Logout,
    AuthFailure,
}

/// One entry of the authentication audit log. The error text, when present,
/// has been redacted before the event is recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: AuthEventKind,
    pub role: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl AuthEvent {
    pub fn new(kind: AuthEventKind, role: impl Into<String>, success: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            role: role.into(),
            success,
            error: None,
            duration_ms: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}
