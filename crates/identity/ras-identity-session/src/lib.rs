//! Stateless session management with encrypted cookies.
//!
//! Session data lives entirely in the cookie, as a compact JWE
//! (`dir` + `A256CBC-HS512`) whose key is derived from a configured secret.
//! Several secrets can be configured at once: the first encrypts, all of them
//! decrypt, which allows rotating secrets without invalidating sessions.
//!
//! ```ignore
//! let sessions = SessionManager::new(SessionOptions::new(secret, "session"))?;
//!
//! let cookie = sessions.create_session(|draft| {
//!     draft.insert("email", "johndoe@example.com");
//! })?;
//! response.headers_mut().append(SET_COOKIE, cookie.set_cookie_header().parse()?);
//!
//! if let Some(record) = sessions.validate_session(&cookie_value)? {
//!     println!("signed in until {}", record.session.expires);
//! }
//! ```

mod config;
mod cookie;
mod error;
pub mod jwe;
mod session;

pub use config::{
    CookieOptions, DEFAULT_MAX_AGE, DEPLOYMENT_ENV_VAR, Deployment, Priority, SameSite, SecretSet,
    SessionOptions,
};
pub use crate::cookie::{CookieAttributes, SessionCookie};
pub use error::{SessionError, SessionResult};
pub use session::{
    Audience, IMMUTABLE_CLAIMS, MUTABLE_CLAIMS, MutableClaims, SessionDraft, SessionInfo,
    SessionManager, SessionRecord, TokenClaims,
};
