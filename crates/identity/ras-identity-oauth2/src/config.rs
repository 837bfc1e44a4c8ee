//! OAuth2 configuration types.

use ras_identity_core::CodeChallengeMethod;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Client credentials and endpoints of one authorization server
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    pub client_id: String,
    pub client_secret: String,
    /// Prefix prepended to both endpoints when set, e.g. `https://github.com`
    #[serde(default)]
    pub token_host: Option<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
}

impl ClientSettings {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_host: None,
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: token_endpoint.into(),
        }
    }

    pub fn with_token_host(mut self, token_host: impl Into<String>) -> Self {
        self.token_host = Some(token_host.into());
        self
    }

    /// Fold `token_host` into the endpoints. Applying it twice is a no-op.
    pub(crate) fn resolve_endpoints(mut self) -> Self {
        if let Some(host) = self.token_host.take() {
            self.authorization_endpoint = format!("{host}{}", self.authorization_endpoint);
            self.token_endpoint = format!("{host}{}", self.token_endpoint);
        }
        self
    }
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_host", &self.token_host)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .finish()
    }
}

/// Parameters of an authorization redirect
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationParams {
    pub redirect_uri: String,
    pub state: Option<String>,
    /// When set, `code_challenge` and `code_challenge_method` are added
    pub code_verifier: Option<String>,
    /// Defaults to S256
    pub code_challenge_method: Option<CodeChallengeMethod>,
    pub scopes: Vec<String>,
    /// Appended in order; empty values are skipped
    pub extra_params: Vec<(String, String)>,
}

impl AuthorizationParams {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uri: redirect_uri.into(),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_code_verifier(mut self, code_verifier: impl Into<String>) -> Self {
        self.code_verifier = Some(code_verifier.into());
        self
    }

    pub fn with_code_challenge_method(mut self, method: CodeChallengeMethod) -> Self {
        self.code_challenge_method = Some(method);
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extra_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.push((key.into(), value.into()));
        self
    }
}

/// Options shared by the provider factories
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOptions {
    pub redirect_uri: String,
    /// Microsoft Entra ID tenant: `common`, `organizations`, `consumers` or a tenant id
    #[serde(default)]
    pub tenant: Option<String>,
}

impl ProviderOptions {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uri: redirect_uri.into(),
            tenant: None,
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}
