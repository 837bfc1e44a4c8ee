//! OAuth2 authorization code flow with PKCE support.
//!
//! [`OAuth2Client`] builds authorization URLs, exchanges authorization codes
//! and refreshes access tokens against any OAuth2 server. The [`provider`]
//! module binds it to well-known providers. The client keeps no state of its
//! own: callers store `state` and the PKCE verifier between the redirect and
//! the callback, typically in short-lived cookies.

mod client;
mod config;
mod error;
pub mod provider;
mod types;


pub use client::{OAuth2Client, RequestHook};
pub use config::{AuthorizationParams, ClientSettings, ProviderOptions};
pub use error::{OAuth2Error, OAuth2RequestError, OAuth2Result, TokenRequest};
pub use provider::{AuthorizationOptions, Provider, ProviderSpec};
pub use types::{OAuth2ErrorResponse, TokenResponse};

// Re-export the PKCE and randomness helpers used alongside the client
pub use ras_identity_core::{
    CodeChallengeMethod, IdentityError, PkceChallenge, decode_id_token, generate_code_challenge,
    generate_random_token,
};
