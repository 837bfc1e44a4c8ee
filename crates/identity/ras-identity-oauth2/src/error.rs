//! OAuth2 error types.

use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use url::Url;

pub type OAuth2Result<T> = Result<T, OAuth2Error>;

#[derive(Debug, Error)]
pub enum OAuth2Error {
    /// The token endpoint rejected the request or answered without an access token
    #[error("OAuth2 request failed: {0}")]
    Request(Box<OAuth2RequestError>),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("A refresh token is required to refresh the access token")]
    MissingRefreshToken,

    #[error("Provider {0} does not issue refresh tokens")]
    RefreshNotSupported(String),

    #[error("Identity error: {0}")]
    IdentityError(#[from] ras_identity_core::IdentityError),
}

impl OAuth2Error {
    pub fn as_request_error(&self) -> Option<&OAuth2RequestError> {
        match self {
            OAuth2Error::Request(error) => Some(error),
            _ => None,
        }
    }
}

impl From<OAuth2RequestError> for OAuth2Error {
    fn from(error: OAuth2RequestError) -> Self {
        OAuth2Error::Request(Box::new(error))
    }
}

/// Snapshot of a request sent to the token endpoint, taken after the
/// request hook ran.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// The `application/x-www-form-urlencoded` body
    pub body: String,
}

impl TokenRequest {
    pub(crate) fn capture(request: &reqwest::Request) -> Self {
        let body = request
            .body()
            .and_then(|body| body.as_bytes())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default();

        Self {
            method: request.method().clone(),
            url: request.url().clone(),
            headers: request.headers().clone(),
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Look up a decoded form parameter of the body
    pub fn form_param(&self, name: &str) -> Option<String> {
        url::form_urlencoded::parse(self.body.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// HTTP or protocol level failure of a token endpoint call.
///
/// Carries the error fields of the response body when the server sent any,
/// and the request that caused it.
#[derive(Debug, Clone)]
pub struct OAuth2RequestError {
    pub status: StatusCode,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub error_uri: Option<String>,
    pub auth_session: Option<Value>,
    pub request: TokenRequest,
}

impl fmt::Display for OAuth2RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error_description, &self.error) {
            (Some(description), _) => f.write_str(description),
            (None, Some(error)) => f.write_str(error),
            (None, None) => write!(f, "token endpoint responded with {}", self.status),
        }
    }
}

impl std::error::Error for OAuth2RequestError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_error(error: Option<&str>, description: Option<&str>) -> OAuth2RequestError {
        OAuth2RequestError {
            status: StatusCode::BAD_REQUEST,
            error: error.map(str::to_string),
            error_description: description.map(str::to_string),
            error_uri: None,
            auth_session: None,
            request: TokenRequest {
                method: Method::POST,
                url: Url::parse("https://example.com/token").unwrap(),
                headers: HeaderMap::new(),
                body: "grant_type=authorization_code&code=a%2Bb".to_string(),
            },
        }
    }

    #[test]
    fn test_display_prefers_description() {
        let error = request_error(Some("invalid_request"), Some("Missing code"));
        assert_eq!(error.to_string(), "Missing code");

        let error = request_error(Some("invalid_request"), None);
        assert_eq!(error.to_string(), "invalid_request");

        let error = request_error(None, None);
        assert_eq!(
            error.to_string(),
            "token endpoint responded with 400 Bad Request"
        );
    }

    #[test]
    fn test_form_param_lookup() {
        let error = request_error(None, None);
        assert_eq!(
            error.request.form_param("grant_type").as_deref(),
            Some("authorization_code")
        );
        assert_eq!(error.request.form_param("code").as_deref(), Some("a+b"));
        assert_eq!(error.request.form_param("code_verifier"), None);
    }

    #[test]
    fn test_request_error_conversion() {
        let error: OAuth2Error = request_error(Some("invalid_grant"), None).into();
        assert_eq!(
            error.as_request_error().and_then(|e| e.error.as_deref()),
            Some("invalid_grant")
        );
        assert!(OAuth2Error::MissingRefreshToken.as_request_error().is_none());
    }
}
