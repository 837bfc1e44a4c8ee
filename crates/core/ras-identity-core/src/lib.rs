//! Core building blocks shared by the identity crates.
//!
//! This crate holds the small, dependency-light utilities that both the
//! session codec and the OAuth2 client rely on:
//!
//! - cryptographically secure random tokens (`state`, `code_verifier`, IVs)
//! - PKCE code challenge derivation (RFC 7636)
//! - read-only decoding of OpenID Connect `id_token` claims

mod error;
mod id_token;
mod pkce;
mod random;

pub use error::{IdentityError, IdentityResult};
pub use id_token::decode_id_token;
pub use pkce::{CodeChallengeMethod, PkceChallenge, generate_code_challenge};
pub use random::{fill_random, generate_random_token};

/// Base64url without padding, the encoding used by every compact token and
/// PKCE value in this workspace.
pub use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL;
