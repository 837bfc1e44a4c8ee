//! Preconfigured authorization servers.
//!
//! Every provider is a [`ProviderSpec`] row driving the same [`Provider`]
//! type, which wraps an [`OAuth2Client`].

use crate::client::OAuth2Client;
use crate::config::{AuthorizationParams, ClientSettings, ProviderOptions};
use crate::error::{OAuth2Error, OAuth2Result};
use crate::types::TokenResponse;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Client, Request};
use url::Url;

/// Placeholder in [`ProviderSpec::token_host`] replaced by the tenant
const TENANT_PLACEHOLDER: &str = "{tenant}";
const DEFAULT_TENANT: &str = "common";

/// How a provider is asked to issue a refresh token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineAccess {
    /// Refresh tokens are issued without asking
    Implicit,
    /// Add this query parameter, e.g. `access_type=offline`
    Param(&'static str, &'static str),
    /// Add this scope, e.g. `offline_access`
    Scope(&'static str),
}

/// Static description of an authorization server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSpec {
    pub id: &'static str,
    pub token_host: Option<&'static str>,
    pub authorization_endpoint: &'static str,
    pub token_endpoint: &'static str,
    pub default_scopes: &'static [&'static str],
    /// Prepend `openid` to the requested scopes
    pub openid: bool,
    pub pkce: bool,
    pub offline_access: OfflineAccess,
    /// Always added to the authorization URL unless the caller overrides them
    pub extra_params: &'static [(&'static str, &'static str)],
    /// Authenticate token requests with HTTP Basic credentials
    pub basic_auth: bool,
    pub refresh: bool,
}

pub const GOOGLE: ProviderSpec = ProviderSpec {
    id: "google",
    token_host: None,
    authorization_endpoint: "https://accounts.google.com/o/oauth2/v2/auth",
    token_endpoint: "https://oauth2.googleapis.com/token",
    default_scopes: &["profile", "email"],
    openid: true,
    pkce: true,
    offline_access: OfflineAccess::Param("access_type", "offline"),
    extra_params: &[],
    basic_auth: false,
    refresh: true,
};

/// GitHub OAuth apps do not support PKCE.
pub const GITHUB: ProviderSpec = ProviderSpec {
    id: "github",
    token_host: Some("https://github.com"),
    authorization_endpoint: "/login/oauth/authorize",
    token_endpoint: "/login/oauth/access_token",
    default_scopes: &["read:user", "user:email"],
    openid: false,
    pkce: false,
    offline_access: OfflineAccess::Implicit,
    extra_params: &[],
    basic_auth: false,
    refresh: true,
};

pub const MICROSOFT_ENTRA_ID: ProviderSpec = ProviderSpec {
    id: "microsoft-entra-id",
    token_host: Some("https://login.microsoftonline.com/{tenant}"),
    authorization_endpoint: "/oauth2/v2.0/authorize",
    token_endpoint: "/oauth2/v2.0/token",
    default_scopes: &["profile", "email"],
    openid: true,
    pkce: true,
    offline_access: OfflineAccess::Scope("offline_access"),
    extra_params: &[],
    basic_auth: false,
    refresh: true,
};

/// Facebook issues long-lived access tokens instead of refresh tokens.
pub const FACEBOOK: ProviderSpec = ProviderSpec {
    id: "facebook",
    token_host: None,
    authorization_endpoint: "https://www.facebook.com/v20.0/dialog/oauth",
    token_endpoint: "https://graph.facebook.com/v20.0/oauth/access_token",
    default_scopes: &["email"],
    openid: false,
    pkce: true,
    offline_access: OfflineAccess::Implicit,
    extra_params: &[],
    basic_auth: false,
    refresh: false,
};

pub const FACEIT: ProviderSpec = ProviderSpec {
    id: "faceit",
    token_host: None,
    authorization_endpoint: "https://accounts.faceit.com",
    token_endpoint: "https://api.faceit.com/auth/v1/oauth/token",
    default_scopes: &["profile", "email"],
    openid: true,
    pkce: true,
    offline_access: OfflineAccess::Implicit,
    extra_params: &[("redirect_popup", "true")],
    basic_auth: true,
    refresh: true,
};

/// Per-call options of [`Provider::authorization_uri`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationOptions {
    /// Replaces the provider's default scopes
    pub scopes: Option<Vec<String>>,
    /// Ask for a refresh token where the provider needs to be asked
    pub offline_access: bool,
    /// Override the provider's fixed parameters with the same name
    pub extra_params: Vec<(String, String)>,
}

impl AuthorizationOptions {
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_offline_access(mut self) -> Self {
        self.offline_access = true;
        self
    }

    pub fn with_extra_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.push((key.into(), value.into()));
        self
    }
}

/// An [`OAuth2Client`] bound to one provider and redirect URI
#[derive(Debug, Clone)]
pub struct Provider {
    spec: ProviderSpec,
    client: OAuth2Client,
    redirect_uri: String,
}

impl Provider {
    pub fn new(
        spec: ProviderSpec,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        options: ProviderOptions,
    ) -> Self {
        let mut settings = ClientSettings::new(
            client_id,
            client_secret,
            spec.authorization_endpoint,
            spec.token_endpoint,
        );
        if let Some(host) = spec.token_host {
            let tenant = options.tenant.as_deref().unwrap_or(DEFAULT_TENANT);
            settings = settings.with_token_host(host.replace(TENANT_PLACEHOLDER, tenant));
        }

        Self::from_settings(spec, settings, options.redirect_uri)
    }

    /// Use the provider's behaviour with custom endpoints, e.g. a regional
    /// deployment or a local mock server.
    pub fn from_settings(
        spec: ProviderSpec,
        settings: ClientSettings,
        redirect_uri: impl Into<String>,
    ) -> Self {
        let mut client = OAuth2Client::new(settings);
        if spec.basic_auth {
            client = client.with_request_hook(basic_auth);
        }

        Self {
            spec,
            client,
            redirect_uri: redirect_uri.into(),
        }
    }

    pub fn with_http_client(mut self, http_client: Client) -> Self {
        self.client = self.client.with_http_client(http_client);
        self
    }

    pub fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    pub fn client(&self) -> &OAuth2Client {
        &self.client
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Build the authorization URL. `code_verifier` is ignored by providers
    /// without PKCE support.
    pub fn authorization_uri(
        &self,
        state: &str,
        code_verifier: &str,
        options: &AuthorizationOptions,
    ) -> OAuth2Result<Url> {
        let mut scopes = Vec::new();
        if self.spec.openid {
            push_scope(&mut scopes, "openid");
        }
        match &options.scopes {
            Some(custom) => custom.iter().for_each(|s| push_scope(&mut scopes, s)),
            None => self
                .spec
                .default_scopes
                .iter()
                .for_each(|s| push_scope(&mut scopes, s)),
        }

        let mut extra_params: Vec<(String, String)> = self
            .spec
            .extra_params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if options.offline_access {
            match self.spec.offline_access {
                OfflineAccess::Implicit => {}
                OfflineAccess::Param(key, value) => {
                    extra_params.push((key.to_string(), value.to_string()))
                }
                OfflineAccess::Scope(scope) => push_scope(&mut scopes, scope),
            }
        }
        for (key, value) in &options.extra_params {
            match extra_params.iter_mut().find(|(k, _)| k == key) {
                Some(existing) => existing.1 = value.clone(),
                None => extra_params.push((key.clone(), value.clone())),
            }
        }

        let mut params = AuthorizationParams::new(&self.redirect_uri).with_state(state);
        params.scopes = scopes;
        params.extra_params = extra_params;
        if self.spec.pkce {
            params = params.with_code_verifier(code_verifier);
        }

        self.client.authorization_uri(&params)
    }

    pub async fn verify_authorization_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> OAuth2Result<TokenResponse> {
        let code_verifier = self.spec.pkce.then_some(code_verifier);
        self.client
            .verify_authorization_code(code, &self.redirect_uri, code_verifier)
            .await
    }

    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
        scopes: Option<&[String]>,
    ) -> OAuth2Result<TokenResponse> {
        if !self.spec.refresh {
            return Err(OAuth2Error::RefreshNotSupported(self.spec.id.to_string()));
        }
        self.client.refresh_access_token(refresh_token, scopes).await
    }
}

fn push_scope(scopes: &mut Vec<String>, scope: &str) {
    if !scopes.iter().any(|existing| existing == scope) {
        scopes.push(scope.to_string());
    }
}

/// Authenticate the token request with `client_id:client_secret` (RFC 7617)
pub fn basic_auth(mut request: Request, settings: &ClientSettings) -> Request {
    let credentials = STANDARD.encode(format!(
        "{}:{}",
        settings.client_id, settings.client_secret
    ));
    if let Ok(value) = HeaderValue::from_str(&format!("Basic {credentials}")) {
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    request
}

pub fn google(
    client_id: impl Into<String>,
    client_secret: impl Into<String>,
    options: ProviderOptions,
) -> Provider {
    Provider::new(GOOGLE, client_id, client_secret, options)
}

pub fn github(
    client_id: impl Into<String>,
    client_secret: impl Into<String>,
    options: ProviderOptions,
) -> Provider {
    Provider::new(GITHUB, client_id, client_secret, options)
}

/// `options.tenant` defaults to `common`
pub fn microsoft_entra_id(
    client_id: impl Into<String>,
    client_secret: impl Into<String>,
    options: ProviderOptions,
) -> Provider {
    Provider::new(MICROSOFT_ENTRA_ID, client_id, client_secret, options)
}

pub fn facebook(
    client_id: impl Into<String>,
    client_secret: impl Into<String>,
    options: ProviderOptions,
) -> Provider {
    Provider::new(FACEBOOK, client_id, client_secret, options)
}

pub fn faceit(
    client_id: impl Into<String>,
    client_secret: impl Into<String>,
    options: ProviderOptions,
) -> Provider {
    Provider::new(FACEIT, client_id, client_secret, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const REDIRECT_URI: &str = "https://app.example.com/callback";

    fn query(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn test_google_authorization_uri() {
        let provider = google("id", "secret", ProviderOptions::new(REDIRECT_URI));
        let url = provider
            .authorization_uri("state_000", "verifier_000", &AuthorizationOptions::default())
            .unwrap();
        let params = query(&url);

        assert!(url.as_str().starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert_eq!(params["scope"], "openid profile email");
        assert_eq!(params["state"], "state_000");
        assert_eq!(params["code_challenge_method"], "S256");
        assert!(!params.contains_key("access_type"));
    }

    #[test]
    fn test_google_offline_access() {
        let provider = google("id", "secret", ProviderOptions::new(REDIRECT_URI));
        let options = AuthorizationOptions::default()
            .with_offline_access()
            .with_scopes(["https://www.googleapis.com/auth/calendar"]);
        let params = query(&provider.authorization_uri("s", "v", &options).unwrap());

        assert_eq!(params["access_type"], "offline");
        assert_eq!(
            params["scope"],
            "openid https://www.googleapis.com/auth/calendar"
        );
    }

    #[test]
    fn test_scopes_are_not_repeated() {
        let provider = google("id", "secret", ProviderOptions::new(REDIRECT_URI));
        let options = AuthorizationOptions::default().with_scopes(["openid", "email", "email"]);
        let params = query(&provider.authorization_uri("s", "v", &options).unwrap());
        assert_eq!(params["scope"], "openid email");

        let provider = microsoft_entra_id("id", "secret", ProviderOptions::new(REDIRECT_URI));
        let options = AuthorizationOptions::default()
            .with_offline_access()
            .with_scopes(["offline_access", "User.Read"]);
        let params = query(&provider.authorization_uri("s", "v", &options).unwrap());
        assert_eq!(params["scope"], "openid offline_access User.Read");
    }

    #[test]
    fn test_github_has_no_pkce() {
        let provider = github("id", "secret", ProviderOptions::new(REDIRECT_URI));
        let url = provider
            .authorization_uri("state_000", "verifier_000", &AuthorizationOptions::default())
            .unwrap();
        let params = query(&url);

        assert_eq!(url.path(), "/login/oauth/authorize");
        assert_eq!(url.host_str(), Some("github.com"));
        assert_eq!(params["scope"], "read:user user:email");
        assert!(!params.contains_key("code_challenge"));
        assert!(!params.contains_key("code_challenge_method"));
        assert_eq!(
            provider.client().settings().token_endpoint,
            "https://github.com/login/oauth/access_token"
        );
    }

    #[test]
    fn test_entra_id_tenant() {
        let provider = microsoft_entra_id("id", "secret", ProviderOptions::new(REDIRECT_URI));
        assert_eq!(
            provider.client().settings().authorization_endpoint,
            "https://login.microsoftonline.com/common/oauth2/v2.0/authorize"
        );

        let provider = microsoft_entra_id(
            "id",
            "secret",
            ProviderOptions::new(REDIRECT_URI).with_tenant("organizations"),
        );
        assert_eq!(
            provider.client().settings().token_endpoint,
            "https://login.microsoftonline.com/organizations/oauth2/v2.0/token"
        );

        let options = AuthorizationOptions::default().with_offline_access();
        let params = query(&provider.authorization_uri("s", "v", &options).unwrap());
        assert_eq!(params["scope"], "openid profile email offline_access");
    }

    #[test]
    fn test_facebook_defaults() {
        let provider = facebook("id", "secret", ProviderOptions::new(REDIRECT_URI));
        let params = query(
            &provider
                .authorization_uri("s", "v", &AuthorizationOptions::default())
                .unwrap(),
        );
        assert_eq!(params["scope"], "email");
        assert!(params.contains_key("code_challenge"));
    }

    #[tokio::test]
    async fn test_facebook_refresh_not_supported() {
        let provider = facebook("id", "secret", ProviderOptions::new(REDIRECT_URI));
        let result = provider.refresh_access_token("refresh_token_000", None).await;
        assert!(matches!(result, Err(OAuth2Error::RefreshNotSupported(id)) if id == "facebook"));
    }

    #[test]
    fn test_faceit_fixed_params() {
        let provider = faceit("id", "secret", ProviderOptions::new(REDIRECT_URI));
        let params = query(
            &provider
                .authorization_uri("s", "v", &AuthorizationOptions::default())
                .unwrap(),
        );
        assert_eq!(params["redirect_popup"], "true");
        assert_eq!(params["scope"], "openid profile email");

        let options = AuthorizationOptions::default().with_extra_param("redirect_popup", "false");
        let url = provider.authorization_uri("s", "v", &options).unwrap();
        let popups: Vec<_> = url
            .query_pairs()
            .filter(|(k, _)| k == "redirect_popup")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(popups, vec!["false"]);
    }

    #[test]
    fn test_basic_auth_header() {
        let settings = ClientSettings::new("client_id_000", "client_secret_000", "/a", "/t");
        let request = Request::new(
            reqwest::Method::POST,
            Url::parse("https://example.com/token").unwrap(),
        );
        let request = basic_auth(request, &settings);

        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Basic Y2xpZW50X2lkXzAwMDpjbGllbnRfc2VjcmV0XzAwMA=="
        );
    }
}
