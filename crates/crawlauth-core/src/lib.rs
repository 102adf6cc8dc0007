//! Role-based authentication and session management for crawlauth.
//!
//! The crate logs a crawler into a site once per configured role, keeps one
//! browser context per role, notices when a session silently expires, and
//! bounds how often a role may re-authenticate. Every credential value it
//! touches is registered with a [`CredentialGuard`] so that logs, events and
//! errors never carry it.
//!
//! Browser automation is reached only through the traits in
//! `crawlauth-browser`.

pub mod authenticator;
pub mod config;
pub mod credentials;
pub mod detector;
pub mod error;
pub mod events;
pub mod guard;
pub mod logging;
pub mod methods;
pub mod session;

#[cfg(test)]
mod test_env;

pub use authenticator::{Authenticator, SessionHandle};
pub use config::{
    AuthConfig, AuthMethod, ConfigError, CredentialEnv, ExpiryIndicator, FormLoginOptions,
    LoginConfig, LoginSelectors, RoleConfig, SessionTimeoutConfig, SuccessIndicator,
};
pub use credentials::ResolvedCredentials;
pub use detector::{Detection, LoginDetector};
pub use error::{AuthError, RedactedCause};
pub use events::{AuthEvent, AuthEventKind};
pub use guard::{CredentialGuard, REDACTED, RedactingMakeWriter};
pub use methods::{FormLoginMethod, FormLoginOutcome, RetryPolicy, SelectorSource, StorageStateMethod};
pub use session::SessionManager;
