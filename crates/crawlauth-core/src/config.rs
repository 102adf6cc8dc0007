//! Authentication configuration.
//!
//! These structures arrive already loaded from the crawler's configuration
//! file. Tagged variants are closed enums, so an unknown `type` discriminator
//! is rejected while deserializing instead of at dispatch time.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

static ROLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("invalid role name regex"));

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one role must be configured")]
    NoRoles,

    #[error("role name '{0}' must match [a-zA-Z0-9_-]+")]
    InvalidRoleName(String),

    #[error("role name '{0}' is configured more than once")]
    DuplicateRole(String),

    #[error("role '{0}' has privilege level 0; levels start at 1")]
    InvalidPrivilegeLevel(String),

    #[error("role '{role}' has an empty {field} environment variable name")]
    EmptyEnvVar { role: String, field: &'static str },

    #[error("login URL '{0}' is not an absolute http(s) URL")]
    InvalidLoginUrl(String),

    #[error("failed to parse auth configuration: {0}")]
    Parse(String),
}

/// Environment variable *names* holding a role's credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialEnv {
    pub identifier_env: String,
    pub secret_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AuthMethod {
    FormLogin,
    #[serde(rename_all = "camelCase")]
    CookieInjection {
        /// Variable holding a JSON array of cookies.
        cookies_env_var: String,
    },
    #[serde(rename_all = "camelCase")]
    TokenInjection { header: String, token_env_var: String },
    StorageState { path: PathBuf },
    #[serde(rename_all = "camelCase")]
    CustomScript { script_path: PathBuf },
}

impl AuthMethod {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthMethod::FormLogin => "form-login",
            AuthMethod::CookieInjection { .. } => "cookie-injection",
            AuthMethod::TokenInjection { .. } => "token-injection",
            AuthMethod::StorageState { .. } => "storage-state",
            AuthMethod::CustomScript { .. } => "custom-script",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoleConfig {
    pub name: String,
    pub credentials: CredentialEnv,
    pub auth_method: AuthMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privilege_level: Option<u32>,
}

/// Selectors for the fields of a login form. Only `password` is mandatory
/// for a set to be usable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LoginSelectors {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub submit: Option<String>,
    #[serde(default)]
    pub form: Option<String>,
}

impl LoginSelectors {
    /// Human-readable description of each populated selector, used in
    /// diagnostics when no form could be found.
    pub fn describe(&self, origin: &str) -> Vec<String> {
        [
            ("identifier", &self.identifier),
            ("password", &self.password),
            ("submit", &self.submit),
            ("form", &self.form),
        ]
        .into_iter()
        .filter_map(|(field, selector)| {
            selector
                .as_ref()
                .map(|s| format!("{origin} {field}: {s}"))
        })
        .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SuccessIndicator {
    UrlPattern { pattern: String },
    ElementVisible { selector: String },
    ElementHidden { selector: String },
    CookiePresent { name: String },
    CookieAbsent { name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExpiryIndicator {
    StatusCode { codes: Vec<u16> },
    RedirectToLogin,
    ElementVisible { selector: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionTimeoutConfig {
    #[serde(default = "default_expiry_indicators")]
    pub indicators: Vec<ExpiryIndicator>,
    #[serde(default = "default_max_reauth_attempts")]
    pub max_reauth_attempts: u32,
}

fn default_expiry_indicators() -> Vec<ExpiryIndicator> {
    vec![
        ExpiryIndicator::StatusCode {
            codes: vec![401, 403],
        },
        ExpiryIndicator::RedirectToLogin,
    ]
}

fn default_max_reauth_attempts() -> u32 {
    3
}

impl Default for SessionTimeoutConfig {
    fn default() -> Self {
        Self {
            indicators: default_expiry_indicators(),
            max_reauth_attempts: default_max_reauth_attempts(),
        }
    }
}

/// Timing knobs for the form-login state machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FormLoginOptions {
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    /// Additional attempts after the first navigation.
    #[serde(default = "default_max_navigation_retries")]
    pub max_navigation_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
    #[serde(default = "default_post_submit_grace_ms")]
    pub post_submit_grace_ms: u64,
}

fn default_navigation_timeout_ms() -> u64 {
    30_000
}
fn default_max_navigation_retries() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1_000
}
fn default_backoff_max_ms() -> u64 {
    30_000
}
fn default_load_timeout_ms() -> u64 {
    30_000
}
fn default_post_submit_grace_ms() -> u64 {
    1_000
}

impl Default for FormLoginOptions {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: default_navigation_timeout_ms(),
            max_navigation_retries: default_max_navigation_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            load_timeout_ms: default_load_timeout_ms(),
            post_submit_grace_ms: default_post_submit_grace_ms(),
        }
    }
}

impl FormLoginOptions {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn post_submit_grace(&self) -> Duration {
        Duration::from_millis(self.post_submit_grace_ms)
    }
}

/// Login page description shared by form-login roles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoginConfig {
    pub login_url: String,
    #[serde(default)]
    pub selectors: Option<LoginSelectors>,
    #[serde(default)]
    pub success_indicators: Vec<SuccessIndicator>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(flatten)]
    pub login: LoginConfig,
    pub roles: Vec<RoleConfig>,
    #[serde(default)]
    pub session_timeout: SessionTimeoutConfig,
    #[serde(default)]
    pub form_login: FormLoginOptions,
}

impl AuthConfig {
    pub fn new(login_url: impl Into<String>, roles: Vec<RoleConfig>) -> Self {
        Self {
            login: LoginConfig {
                login_url: login_url.into(),
                selectors: None,
                success_indicators: Vec::new(),
            },
            roles,
            session_timeout: SessionTimeoutConfig::default(),
            form_login: FormLoginOptions::default(),
        }
    }

    /// Parse a TOML document and validate it.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: AuthConfig =
            toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.roles.is_empty() {
            return Err(ConfigError::NoRoles);
        }

        let login_url_ok = url::Url::parse(&self.login.login_url)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
            .unwrap_or(false);
        if !login_url_ok {
            return Err(ConfigError::InvalidLoginUrl(self.login.login_url.clone()));
        }

        let mut seen = HashSet::new();
        for role in &self.roles {
            if !ROLE_NAME.is_match(&role.name) {
                return Err(ConfigError::InvalidRoleName(role.name.clone()));
            }
            if !seen.insert(role.name.as_str()) {
                return Err(ConfigError::DuplicateRole(role.name.clone()));
            }
            if role.privilege_level == Some(0) {
                return Err(ConfigError::InvalidPrivilegeLevel(role.name.clone()));
            }
            for (field, value) in [
                ("identifier", &role.credentials.identifier_env),
                ("secret", &role.credentials.secret_env),
            ] {
                if value.trim().is_empty() {
                    return Err(ConfigError::EmptyEnvVar {
                        role: role.name.clone(),
                        field,
                    });
                }
            }
        }

        Ok(())
    }

    pub fn role(&self, name: &str) -> Option<&RoleConfig> {
        self.roles.iter().find(|role| role.name == name)
    }

    /// Explicit privilege level, else the role's 1-based configuration
    /// position.
    pub fn privilege_level(&self, name: &str) -> Option<u32> {
        self.roles
            .iter()
            .position(|role| role.name == name)
            .map(|index| {
                self.roles[index]
                    .privilege_level
                    .unwrap_or(index as u32 + 1)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(name: &str) -> RoleConfig {
        RoleConfig {
            name: name.to_string(),
            credentials: CredentialEnv {
                identifier_env: format!("{}_EMAIL", name.to_uppercase()),
                secret_env: format!("{}_PASSWORD", name.to_uppercase()),
            },
            auth_method: AuthMethod::FormLogin,
            privilege_level: None,
        }
    }

    #[test]
    fn parses_toml_with_defaults() {
        let raw = r##"
loginUrl = "https://app.example.com/login"

[[successIndicators]]
type = "url-pattern"
pattern = "/dashboard"

[[roles]]
name = "admin"
privilegeLevel = 10
credentials = { identifierEnv = "ADMIN_EMAIL", secretEnv = "ADMIN_PASSWORD" }
authMethod = { type = "form-login" }

[[roles]]
name = "viewer"
credentials = { identifierEnv = "VIEWER_EMAIL", secretEnv = "VIEWER_PASSWORD" }
authMethod = { type = "storage-state", path = ".auth/viewer.json" }
"##;

        let config = AuthConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.roles.len(), 2);
        assert_eq!(config.roles[0].auth_method, AuthMethod::FormLogin);
        assert_eq!(
            config.roles[1].auth_method,
            AuthMethod::StorageState {
                path: PathBuf::from(".auth/viewer.json")
            }
        );
        assert_eq!(
            config.login.success_indicators,
            vec![SuccessIndicator::UrlPattern {
                pattern: "/dashboard".to_string()
            }]
        );
        assert_eq!(config.session_timeout.max_reauth_attempts, 3);
        assert_eq!(config.form_login.navigation_timeout_ms, 30_000);
        assert_eq!(config.privilege_level("admin"), Some(10));
        assert_eq!(config.privilege_level("viewer"), Some(2));
        assert_eq!(config.privilege_level("ghost"), None);
    }

    #[test]
    fn unknown_auth_method_is_rejected_at_parse_time() {
        let raw = r##"
loginUrl = "https://app.example.com/login"

[[roles]]
name = "admin"
credentials = { identifierEnv = "A", secretEnv = "B" }
authMethod = { type = "magic-link" }
"##;
        assert!(matches!(
            AuthConfig::from_toml_str(raw),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn validate_rejects_bad_role_names_and_duplicates() {
        let mut config = AuthConfig::new("https://app.example.com/login", vec![role("admin")]);
        assert!(config.validate().is_ok());

        config.roles.push(role("admin"));
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateRole("admin".to_string()))
        );

        config.roles = vec![role("bad name")];
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidRoleName("bad name".to_string()))
        );
    }

    #[test]
    fn validate_rejects_empty_config_and_relative_login_url() {
        let config = AuthConfig::new("https://app.example.com/login", vec![]);
        assert_eq!(config.validate(), Err(ConfigError::NoRoles));

        let config = AuthConfig::new("/login", vec![role("admin")]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLoginUrl(_))
        ));
    }

    #[test]
    fn validate_rejects_zero_privilege_and_empty_env_names() {
        let mut admin = role("admin");
        admin.privilege_level = Some(0);
        let config = AuthConfig::new("https://app.example.com/login", vec![admin]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPrivilegeLevel(_))
        ));

        let mut admin = role("admin");
        admin.credentials.secret_env = " ".to_string();
        let config = AuthConfig::new("https://app.example.com/login", vec![admin]);
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyEnvVar {
                role: "admin".to_string(),
                field: "secret"
            })
        );
    }

    #[test]
    fn selector_descriptions_skip_missing_fields() {
        let selectors = LoginSelectors {
            identifier: Some("#email".to_string()),
            password: Some("#pw".to_string()),
            submit: None,
            form: None,
        };
        assert_eq!(
            selectors.describe("configured"),
            vec!["configured identifier: #email", "configured password: #pw"]
        );
    }
}
