//! Sign in with Google and keep the user in an encrypted session cookie.
//!
//! ```sh
//! GOOGLE_CLIENT_ID=... GOOGLE_CLIENT_SECRET=... SESSION_SECRET=... \
//!     cargo run -p ras-identity-oauth2 --example google_signin
//! ```
//!
//! Set `APP_ENV=production` to mark cookies `Secure`.

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use cookie::time::Duration;
use ras_identity_oauth2::provider::{self, Provider};
use ras_identity_oauth2::{AuthorizationOptions, ProviderOptions, generate_random_token};
use ras_identity_session::{SessionError, SessionManager, SessionOptions};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

const STATE_COOKIE: &str = "google_oauth_state";
const VERIFIER_COOKIE: &str = "google_code_verifier";
/// Lifetime of the state and verifier cookies
const FLOW_COOKIE_MAX_AGE: Duration = Duration::minutes(10);

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub google_client_id: String,
    pub google_client_secret: String,
    pub redirect_uri: String,
    /// Comma separated, newest first
    pub session_secrets: Vec<String>,
    pub bind_addr: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            google_client_id: std::env::var("GOOGLE_CLIENT_ID")
                .context("GOOGLE_CLIENT_ID environment variable is required")?,
            google_client_secret: std::env::var("GOOGLE_CLIENT_SECRET")
                .context("GOOGLE_CLIENT_SECRET environment variable is required")?,
            redirect_uri: std::env::var("REDIRECT_URI")
                .unwrap_or_else(|_| "http://localhost:3000/login/google/callback".to_string()),
            session_secrets: std::env::var("SESSION_SECRET")
                .context("SESSION_SECRET environment variable is required")?
                .split(',')
                .map(|secret| secret.trim().to_string())
                .collect(),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string()),
        })
    }
}

#[derive(Clone)]
struct AppState {
    google: Arc<Provider>,
    sessions: Arc<SessionManager>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

struct AppError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(error: E) -> Self {
        Self(error.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Request failed: {:#}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong").into_response()
    }
}

fn flow_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .max_age(FLOW_COOKIE_MAX_AGE)
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}

async fn index_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Html<String>, AppError> {
    let token = jar
        .get(state.sessions.cookie_name())
        .map(|cookie| cookie.value())
        .unwrap_or_default();

    let record = match state.sessions.validate_session(token) {
        Ok(record) => record,
        Err(SessionError::KeyMismatch) => {
            warn!("Session cookie was issued under an unknown secret");
            None
        }
        Err(err) => return Err(err.into()),
    };

    let page = match record {
        Some(record) => {
            let name = record
                .session
                .user
                .get("name")
                .and_then(|name| name.as_str())
                .unwrap_or("stranger");
            format!(
                "<p>Signed in as {name} until {}.</p><a href=\"/logout\">Sign out</a>",
                record.session.expires
            )
        }
        None => "<a href=\"/login/google\">Sign in with Google</a>".to_string(),
    };
    Ok(Html(page))
}

async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let oauth_state = generate_random_token()?;
    let code_verifier = generate_random_token()?;
    let url = state.google.authorization_uri(
        &oauth_state,
        &code_verifier,
        &AuthorizationOptions::default().with_offline_access(),
    )?;

    let jar = jar
        .add(flow_cookie(STATE_COOKIE, oauth_state))
        .add(flow_cookie(VERIFIER_COOKIE, code_verifier));
    Ok((jar, Redirect::to(url.as_str())).into_response())
}

async fn callback_handler(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    if let Some(error) = query.error {
        warn!("Google returned an error: {}", error);
        return Ok((StatusCode::BAD_REQUEST, "Sign in was cancelled").into_response());
    }

    let expected_state = jar.get(STATE_COOKIE).map(|cookie| cookie.value());
    let code_verifier = jar.get(VERIFIER_COOKIE).map(|cookie| cookie.value());
    let (Some(code), Some(code_verifier)) = (query.code, code_verifier) else {
        return Ok((StatusCode::BAD_REQUEST, "Missing authorization code").into_response());
    };
    if expected_state.is_none() || query.state.as_deref() != expected_state {
        return Ok((StatusCode::BAD_REQUEST, "Invalid state").into_response());
    }

    let token = match state
        .google
        .verify_authorization_code(&code, code_verifier)
        .await
    {
        Ok(token) => token,
        Err(err) => match err.as_request_error() {
            Some(request_error) => {
                warn!("Code exchange rejected: {}", request_error);
                return Ok((StatusCode::BAD_REQUEST, "Sign in failed").into_response());
            }
            None => return Err(err.into()),
        },
    };

    let claims = token.id_token_claims()?.unwrap_or_default();
    let cookie = state.sessions.create_session(|draft| {
        for key in ["name", "email", "picture"] {
            if let Some(value) = claims.get(key) {
                draft.insert(key, value.clone());
            }
        }
        draft.token.sub = claims
            .get("sub")
            .and_then(|sub| sub.as_str())
            .map(str::to_string);
    })?;
    info!("User signed in");

    let jar = jar
        .add(cookie.to_cookie())
        .remove(removal_cookie(STATE_COOKIE))
        .remove(removal_cookie(VERIFIER_COOKIE));
    Ok((jar, Redirect::to("/")).into_response())
}

async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let mut cookie = state.sessions.create_blank_session();
    cookie.options.max_age = 0;

    Ok((jar.add(cookie.to_cookie()), Redirect::to("/")).into_response())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env()?;

    let google = provider::google(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
        ProviderOptions::new(config.redirect_uri.clone()),
    );
    let sessions = SessionManager::new(SessionOptions::new(config.session_secrets, "session"))
        .context("Invalid session configuration")?;

    let app_state = AppState {
        google: Arc::new(google),
        sessions: Arc::new(sessions),
    };

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/login/google", get(login_handler))
        .route("/login/google/callback", get(callback_handler))
        .route("/logout", get(logout_handler))
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("Server running on http://{}", config.bind_addr);
    info!("OAuth2 redirect URI: {}", config.redirect_uri);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
