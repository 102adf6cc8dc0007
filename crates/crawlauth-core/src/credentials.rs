//! Credential values resolved from the environment at authenticate time.

use crate::config::RoleConfig;
use crate::error::AuthError;
use std::fmt;
use zeroize::Zeroizing;

/// Placeholders substituted for literal credential values in error text.
pub const IDENTIFIER_PLACEHOLDER: &str = "[IDENTIFIER]";
pub const SECRET_PLACEHOLDER: &str = "[SECRET]";

/// An identifier/secret pair. Never persisted; both values are wiped from
/// memory on drop and hidden from `Debug`.
pub struct ResolvedCredentials {
    identifier: Zeroizing<String>,
    secret: Zeroizing<String>,
}

impl ResolvedCredentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: Zeroizing::new(identifier.into()),
            secret: Zeroizing::new(secret.into()),
        }
    }

    /// Read both configured variables. Every missing or empty variable is
    /// named in the error.
    pub fn from_env(role: &RoleConfig) -> Result<Self, AuthError> {
        let lookup = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let identifier = lookup(&role.credentials.identifier_env);
        let secret = lookup(&role.credentials.secret_env);

        match (identifier, secret) {
            (Some(identifier), Some(secret)) => Ok(Self::new(identifier, secret)),
            (identifier, secret) => {
                let mut missing = Vec::new();
                if identifier.is_none() {
                    missing.push(role.credentials.identifier_env.clone());
                }
                if secret.is_none() {
                    missing.push(role.credentials.secret_env.clone());
                }
                Err(AuthError::CredentialsNotFound {
                    role: role.name.clone(),
                    missing,
                })
            }
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Replace literal occurrences of either value with a fixed placeholder.
    /// The longer value goes first so one containing the other is not split.
    pub fn scrub(&self, text: &str) -> String {
        let mut pairs = [
            (self.identifier.as_str(), IDENTIFIER_PLACEHOLDER),
            (self.secret.as_str(), SECRET_PLACEHOLDER),
        ];
        pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let mut output = text.to_string();
        for (value, placeholder) in pairs {
            if !value.is_empty() {
                output = output.replace(value, placeholder);
            }
        }
        output
    }
}

impl fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("identifier", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMethod, CredentialEnv};

    #[test]
    fn debug_never_prints_values() {
        let creds = ResolvedCredentials::new("alice@example.com", "hunter22");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("alice"));
        assert!(!debug.contains("hunter22"));
    }

    #[test]
    fn scrub_replaces_longer_value_first() {
        let creds = ResolvedCredentials::new("admin", "admin-password");
        assert_eq!(
            creds.scrub("user admin typed admin-password"),
            "user [IDENTIFIER] typed [SECRET]"
        );
    }

    #[test]
    fn from_env_names_missing_variables() {
        crate::test_env::init();
        let role = RoleConfig {
            name: "auditor".to_string(),
            credentials: CredentialEnv {
                identifier_env: "CRAWLAUTH_CREDS_TEST_ID".to_string(),
                secret_env: "CRAWLAUTH_CREDS_TEST_UNSET_PW".to_string(),
            },
            auth_method: AuthMethod::FormLogin,
            privilege_level: None,
        };

        match ResolvedCredentials::from_env(&role) {
            Err(AuthError::CredentialsNotFound { role, missing }) => {
                assert_eq!(role, "auditor");
                assert_eq!(missing, vec!["CRAWLAUTH_CREDS_TEST_UNSET_PW".to_string()]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn from_env_reads_both_values() {
        crate::test_env::init();
        let role = RoleConfig {
            name: "auditor".to_string(),
            credentials: CredentialEnv {
                identifier_env: "CRAWLAUTH_CREDS_TEST_ID".to_string(),
                secret_env: "CRAWLAUTH_CREDS_TEST_PW".to_string(),
            },
            auth_method: AuthMethod::FormLogin,
            privilege_level: None,
        };

        let creds = ResolvedCredentials::from_env(&role).unwrap();
        assert_eq!(creds.identifier(), "auditor@example.com");
        assert_eq!(creds.secret(), "auditor-secret");
    }
}
