//! Session error types.

use ras_identity_core::IdentityError;
use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Missing secret: at least one non-empty secret is required")]
    MissingSecret,

    #[error("Missing cookie name")]
    MissingCookieName,

    #[error("Session max age of {0} seconds is out of range")]
    InvalidMaxAge(u64),

    #[error("No session data was provided; the session must contain at least one claim")]
    EmptySessionData,

    #[error("Claim {0:?} is reserved and cannot be part of the session data")]
    ReservedClaim(String),

    #[error("Session token is {size} bytes, exceeding the {limit} byte cookie limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("The decryption key did not match any configured secret")]
    KeyMismatch,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Token authentication failed")]
    InvalidToken,

    #[error("Token expired")]
    Expired,

    #[error("Token not yet valid")]
    NotYetValid,

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Whether this error comes from invalid session options rather than a token.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SessionError::MissingSecret
                | SessionError::MissingCookieName
                | SessionError::InvalidMaxAge(_)
        )
    }
}
