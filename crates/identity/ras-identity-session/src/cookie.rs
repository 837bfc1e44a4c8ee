//! Session cookie descriptor.

use cookie::Cookie;
use cookie::time::Duration;
use serde::{Deserialize, Serialize};

use crate::config::{CookieOptions, Deployment, Priority, SameSite};

/// Resolved cookie attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub max_age: u64,
    pub same_site: SameSite,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl CookieAttributes {
    /// Apply caller overrides on top of the defaults (`HttpOnly`, `Path=/`,
    /// `SameSite=Lax`, `Secure` in production only).
    pub fn resolve(overrides: &CookieOptions, max_age: u64, deployment: Deployment) -> Self {
        Self {
            domain: overrides.domain.clone().filter(|d| !d.is_empty()),
            path: overrides.path.clone().unwrap_or_else(|| "/".to_string()),
            secure: overrides
                .secure
                .unwrap_or(deployment == Deployment::Production),
            http_only: overrides.http_only.unwrap_or(true),
            max_age,
            same_site: overrides.same_site.unwrap_or_default(),
            priority: overrides.priority,
        }
    }
}

/// A cookie for the caller to set on its HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub options: CookieAttributes,
}

impl SessionCookie {
    /// Convert into a [`Cookie`] for cookie jars such as axum-extra's `CookieJar`.
    ///
    /// `Priority` has no counterpart in [`Cookie`] and is only emitted by
    /// [`SessionCookie::set_cookie_header`].
    pub fn to_cookie(&self) -> Cookie<'static> {
        let options = &self.options;
        let max_age = i64::try_from(options.max_age).unwrap_or(i64::MAX);

        let mut builder = Cookie::build((self.name.clone(), self.value.clone()))
            .path(options.path.clone())
            .max_age(Duration::seconds(max_age))
            .http_only(options.http_only)
            .secure(options.secure)
            .same_site(options.same_site.into());
        if let Some(domain) = &options.domain {
            builder = builder.domain(domain.clone());
        }
        builder.build()
    }

    /// Render as a `Set-Cookie` header value.
    pub fn set_cookie_header(&self) -> String {
        let header = self.to_cookie().to_string();
        match self.options.priority {
            Some(priority) => format!("{header}; Priority={}", priority.as_str()),
            None => header,
        }
    }
}
