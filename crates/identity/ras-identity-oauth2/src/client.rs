//! OAuth2 authorization code client with PKCE support.

use crate::config::{AuthorizationParams, ClientSettings};
use crate::error::{OAuth2Error, OAuth2RequestError, OAuth2Result, TokenRequest};
use crate::types::{OAuth2ErrorResponse, TokenResponse};
use ras_identity_core::generate_code_challenge;
use reqwest::header::ACCEPT;
use reqwest::{Client, Request, StatusCode};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Rewrites a token request just before it is sent, e.g. to add
/// authentication headers a provider requires.
pub type RequestHook = Arc<dyn Fn(Request, &ClientSettings) -> Request + Send + Sync>;

/// OAuth2 client for one authorization server.
///
/// Keeps no state between calls: `state` and `code_verifier` are owned by the
/// caller between the redirect and the callback.
#[derive(Clone)]
pub struct OAuth2Client {
    settings: ClientSettings,
    http_client: Client,
    request_hook: Option<RequestHook>,
}

impl OAuth2Client {
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings: settings.resolve_endpoints(),
            http_client: Client::new(),
            request_hook: None,
        }
    }

    /// Use a preconfigured HTTP client, e.g. one with a timeout
    pub fn with_http_client(mut self, http_client: Client) -> Self {
        self.http_client = http_client;
        self
    }

    pub fn with_request_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(Request, &ClientSettings) -> Request + Send + Sync + 'static,
    {
        self.request_hook = Some(Arc::new(hook));
        self
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Build the URL the user agent is redirected to
    pub fn authorization_uri(&self, params: &AuthorizationParams) -> OAuth2Result<Url> {
        let mut url = Url::parse(&self.settings.authorization_endpoint)?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.settings.client_id);
            query.append_pair("response_type", "code");
            query.append_pair("redirect_uri", &params.redirect_uri);

            if !params.scopes.is_empty() {
                query.append_pair("scope", &params.scopes.join(" "));
            }
            if let Some(state) = non_empty(&params.state) {
                query.append_pair("state", state);
            }
            if let Some(verifier) = non_empty(&params.code_verifier) {
                let method = params.code_challenge_method.unwrap_or_default();
                query.append_pair("code_challenge", &generate_code_challenge(verifier, method));
                query.append_pair("code_challenge_method", method.as_str());
            }
            for (key, value) in &params.extra_params {
                if !value.is_empty() {
                    query.append_pair(key, value);
                }
            }
        }

        debug!(
            "Generated authorization URL for client {} at {}",
            self.settings.client_id, self.settings.authorization_endpoint
        );
        Ok(url)
    }

    /// Exchange an authorization code for tokens
    pub async fn verify_authorization_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> OAuth2Result<TokenResponse> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        if let Some(verifier) = code_verifier.filter(|v| !v.is_empty()) {
            form.push(("code_verifier", verifier));
        }

        let token = self.request_token(&form).await?;
        info!("Successfully exchanged code for tokens");
        Ok(token)
    }

    /// Obtain a new access token from a refresh token
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
        scopes: Option<&[String]>,
    ) -> OAuth2Result<TokenResponse> {
        if refresh_token.is_empty() {
            return Err(OAuth2Error::MissingRefreshToken);
        }

        let scope = scopes.map(|scopes| scopes.join(" "));
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        if let Some(scope) = scope.as_deref() {
            form.push(("scope", scope));
        }

        let token = self.request_token(&form).await?;
        info!("Successfully refreshed access token");
        Ok(token)
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> OAuth2Result<TokenResponse> {
        let mut request = self
            .http_client
            .post(&self.settings.token_endpoint)
            .header(ACCEPT, "application/json")
            .form(form)
            .build()?;

        if let Some(hook) = &self.request_hook {
            request = hook(request, &self.settings);
        }
        let snapshot = TokenRequest::capture(&request);

        let response = self.http_client.execute(request).await.map_err(|e| {
            error!("Token endpoint request failed: {}", e);
            OAuth2Error::HttpError(e)
        })?;
        let status = response.status();
        let body = response.bytes().await?;
        let body: Option<Value> = serde_json::from_slice(&body).ok();

        classify_response(status, body, snapshot)
    }
}

impl fmt::Debug for OAuth2Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Client")
            .field("settings", &self.settings)
            .field("request_hook", &self.request_hook.is_some())
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// A successful status with an `access_token` is a token response; anything
/// else is an [`OAuth2RequestError`].
fn classify_response(
    status: StatusCode,
    body: Option<Value>,
    request: TokenRequest,
) -> OAuth2Result<TokenResponse> {
    let body = match body {
        Some(body)
            if status.is_success() && body.get("access_token").is_some_and(Value::is_string) =>
        {
            return serde_json::from_value(body)
                .map_err(|e| OAuth2Error::InvalidTokenResponse(e.to_string()));
        }
        body => body,
    };

    let details: OAuth2ErrorResponse = body
        .and_then(|body| serde_json::from_value(body).ok())
        .unwrap_or_default();
    warn!(
        "Token endpoint responded with {} ({})",
        status,
        details.error.as_deref().unwrap_or("no error code")
    );

    Err(OAuth2RequestError {
        status,
        error: details.error,
        error_description: details.error_description,
        error_uri: details.error_uri,
        auth_session: details.auth_session,
        request,
    }
    .into())
}
