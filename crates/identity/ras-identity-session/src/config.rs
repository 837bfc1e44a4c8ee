//! Session configuration types.

use serde::{Deserialize, Serialize};

/// The default session lifetime in seconds: 30 days.
pub const DEFAULT_MAX_AGE: u64 = 30 * 24 * 60 * 60;

/// Environment variable consulted for the default [`Deployment`].
pub const DEPLOYMENT_ENV_VAR: &str = "APP_ENV";

/// Ordered set of secrets.
///
/// The first secret encrypts new tokens; all of them are tried when
/// decrypting, so prepending a new secret rotates keys without logging
/// anyone out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SecretSetRepr", into = "Vec<String>")]
pub struct SecretSet(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum SecretSetRepr {
    One(String),
    Many(Vec<String>),
}

impl From<SecretSetRepr> for SecretSet {
    fn from(repr: SecretSetRepr) -> Self {
        match repr {
            SecretSetRepr::One(secret) => Self(vec![secret]),
            SecretSetRepr::Many(secrets) => Self(secrets),
        }
    }
}

impl From<SecretSet> for Vec<String> {
    fn from(set: SecretSet) -> Self {
        set.0
    }
}

impl SecretSet {
    pub fn new(secrets: Vec<String>) -> Self {
        Self(secrets)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// True when there is no secret or any secret is empty.
    pub fn is_incomplete(&self) -> bool {
        self.0.is_empty() || self.0.iter().any(|secret| secret.is_empty())
    }
}

impl From<&str> for SecretSet {
    fn from(secret: &str) -> Self {
        Self(vec![secret.to_string()])
    }
}

impl From<String> for SecretSet {
    fn from(secret: String) -> Self {
        Self(vec![secret])
    }
}

impl From<Vec<String>> for SecretSet {
    fn from(secrets: Vec<String>) -> Self {
        Self(secrets)
    }
}

impl<const N: usize> From<[&str; N]> for SecretSet {
    fn from(secrets: [&str; N]) -> Self {
        Self(secrets.iter().map(|s| s.to_string()).collect())
    }
}

/// `SameSite` cookie attribute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl From<SameSite> for cookie::SameSite {
    fn from(same_site: SameSite) -> Self {
        match same_site {
            SameSite::Strict => cookie::SameSite::Strict,
            SameSite::Lax => cookie::SameSite::Lax,
            SameSite::None => cookie::SameSite::None,
        }
    }
}

/// `Priority` cookie attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

/// Where the application runs; decides whether cookies default to `Secure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    Development,
    Production,
}

impl Deployment {
    /// Read [`DEPLOYMENT_ENV_VAR`]; only `production` selects [`Deployment::Production`].
    pub fn from_env() -> Self {
        match std::env::var(DEPLOYMENT_ENV_VAR) {
            Ok(value) if value.eq_ignore_ascii_case("production") => Deployment::Production,
            _ => Deployment::Development,
        }
    }
}

impl Default for Deployment {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Caller overrides for the session cookie attributes.
///
/// Unset fields fall back to secure defaults. `Max-Age` is not part of this
/// type: it always follows [`SessionOptions::max_age`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieOptions {
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: Option<bool>,
    pub http_only: Option<bool>,
    pub same_site: Option<SameSite>,
    pub priority: Option<Priority>,
}

impl CookieOptions {
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = Some(http_only);
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Session manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    /// Secrets used, together with `salt`, to derive the token encryption key
    #[serde(default)]
    pub secret: SecretSet,
    #[serde(default)]
    pub salt: String,
    /// Lifetime of both the cookie and the token, in seconds
    #[serde(default = "default_max_age")]
    pub max_age: u64,
    #[serde(default)]
    pub cookie_name: String,
    #[serde(default)]
    pub cookie: CookieOptions,
    #[serde(default)]
    pub deployment: Deployment,
}

fn default_max_age() -> u64 {
    DEFAULT_MAX_AGE
}

impl SessionOptions {
    pub fn new(secret: impl Into<SecretSet>, cookie_name: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            salt: String::new(),
            max_age: DEFAULT_MAX_AGE,
            cookie_name: cookie_name.into(),
            cookie: CookieOptions::default(),
            deployment: Deployment::default(),
        }
    }

    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }

    pub fn with_max_age(mut self, seconds: u64) -> Self {
        self.max_age = seconds;
        self
    }

    pub fn with_cookie(mut self, cookie: CookieOptions) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_deployment(mut self, deployment: Deployment) -> Self {
        self.deployment = deployment;
        self
    }
}
