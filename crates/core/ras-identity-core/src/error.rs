use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("No cryptographically secure random source available: {0}")]
    NoCryptoSource(String),

    #[error("Invalid code challenge method: {0:?} (expected \"S256\" or \"plain\")")]
    InvalidChallengeMethod(String),

    #[error("Failed to decode the given id_token: {0}")]
    TokenDecode(String),
}

pub type IdentityResult<T> = Result<T, IdentityError>;
