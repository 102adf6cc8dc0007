//! Error types for the authentication subsystem.
//!
//! No variant ever carries a resolved credential value. Free-form text that
//! originates outside this crate (driver messages, wrapped causes) is
//! scrubbed before it is stored.

use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// A wrapped cause whose message has already been scrubbed of secrets.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct RedactedCause(String);

impl RedactedCause {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication failed for role '{role}': {message}")]
    Authentication {
        role: String,
        message: String,
        #[source]
        cause: Option<RedactedCause>,
    },

    #[error(
        "credentials not found for role '{role}': missing environment variables {}",
        .missing.join(", ")
    )]
    CredentialsNotFound { role: String, missing: Vec<String> },

    #[error("login form not detected at {url} (tried: {})", .attempted.join("; "))]
    LoginFormNotFound { url: String, attempted: Vec<String> },

    #[error("login URL unreachable: {url} after {attempts} attempt(s): {reason}")]
    LoginUrlUnreachable {
        url: String,
        reason: String,
        attempts: u32,
    },

    #[error("storage state file not found: {}", .path.display())]
    StorageStateNotFound { path: PathBuf },

    #[error("session expired for role '{role}': {attempts} re-authentication attempts exhausted")]
    SessionExpired { role: String, attempts: u32 },

    #[error("credential leak detected in {location}")]
    CredentialLeak { location: String },

    #[error("invalid auth configuration: {0}")]
    Config(#[from] ConfigError),
}

impl AuthError {
    pub fn authentication(role: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authentication {
            role: role.into(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn unknown_role(role: &str) -> Self {
        Self::authentication(role, "role is not configured")
    }

    /// Attach `role` to a role-less [`AuthError::Authentication`].
    pub fn for_role(self, role: &str) -> Self {
        match self {
            AuthError::Authentication {
                role: current,
                message,
                cause,
            } if current.is_empty() => AuthError::Authentication {
                role: role.to_string(),
                message,
                cause,
            },
            other => other,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Authentication { .. } => "AUTH_FAILED",
            AuthError::CredentialsNotFound { .. } => "AUTH_CREDENTIALS_NOT_FOUND",
            AuthError::LoginFormNotFound { .. } => "AUTH_LOGIN_FORM_NOT_FOUND",
            AuthError::LoginUrlUnreachable { .. } => "AUTH_LOGIN_URL_UNREACHABLE",
            AuthError::StorageStateNotFound { .. } => "AUTH_STORAGE_STATE_NOT_FOUND",
            AuthError::SessionExpired { .. } => "AUTH_SESSION_EXPIRED",
            AuthError::CredentialLeak { .. } => "AUTH_CREDENTIAL_LEAK",
            AuthError::Config(_) => "AUTH_INVALID_CONFIG",
        }
    }

    /// Static remediation hint. Never interpolates runtime values.
    pub fn remediation(&self) -> &'static str {
        match self {
            AuthError::Authentication { .. } => {
                "Check the role name, its auth method, and that the credentials are still valid."
            }
            AuthError::CredentialsNotFound { .. } => {
                "Export the listed environment variables before starting the crawl."
            }
            AuthError::LoginFormNotFound { .. } => {
                "Verify the login URL and configure explicit selectors if the markup is unusual."
            }
            AuthError::LoginUrlUnreachable { .. } => {
                "Confirm the login URL is reachable from this host and the server is healthy."
            }
            AuthError::StorageStateNotFound { .. } => {
                "Log in once and save a storage-state snapshot, or fix the configured path."
            }
            AuthError::SessionExpired { .. } => {
                "Re-authentication keeps failing; check for revoked credentials or site changes."
            }
            AuthError::CredentialLeak { .. } => {
                "A secret reached an output sink unredacted; route that output through the credential guard."
            }
            AuthError::Config(_) => "Fix the auth section of the crawler configuration.",
        }
    }

    /// Apply `scrub` to every free-form text field.
    pub fn map_text(self, scrub: impl Fn(&str) -> String) -> Self {
        match self {
            AuthError::Authentication {
                role,
                message,
                cause,
            } => AuthError::Authentication {
                role,
                message: scrub(&message),
                cause: cause.map(|c| RedactedCause::new(scrub(c.message()))),
            },
            AuthError::LoginUrlUnreachable {
                url,
                reason,
                attempts,
            } => AuthError::LoginUrlUnreachable {
                url: scrub(&url),
                reason: scrub(&reason),
                attempts,
            },
            AuthError::LoginFormNotFound { url, attempted } => AuthError::LoginFormNotFound {
                url: scrub(&url),
                attempted,
            },
            other => other,
        }
    }
}
