//! PKCE (Proof Key for Code Exchange) helpers, RFC 7636.

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::BASE64URL;
use crate::error::{IdentityError, IdentityResult};
use crate::random::generate_random_token;

/// How the `code_challenge` is derived from the `code_verifier`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    #[default]
    S256,
    #[serde(rename = "plain")]
    Plain,
}

impl CodeChallengeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeChallengeMethod::S256 => "S256",
            CodeChallengeMethod::Plain => "plain",
        }
    }
}

impl fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeChallengeMethod {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S256" => Ok(CodeChallengeMethod::S256),
            "plain" => Ok(CodeChallengeMethod::Plain),
            other => Err(IdentityError::InvalidChallengeMethod(other.to_string())),
        }
    }
}

/// Derive the `code_challenge` for a verifier.
///
/// `S256` is `BASE64URL(SHA256(verifier))`, `plain` returns the verifier as is.
pub fn generate_code_challenge(verifier: &str, method: CodeChallengeMethod) -> String {
    match method {
        CodeChallengeMethod::S256 => {
            let digest = Sha256::digest(verifier.as_bytes());
            BASE64URL.encode(digest)
        }
        CodeChallengeMethod::Plain => verifier.to_string(),
    }
}

/// PKCE code challenge and verifier
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: CodeChallengeMethod,
}

impl PkceChallenge {
    /// Generate a fresh verifier and its S256 challenge
    pub fn new() -> IdentityResult<Self> {
        let code_verifier = generate_random_token()?;
        let code_challenge = generate_code_challenge(&code_verifier, CodeChallengeMethod::S256);

        Ok(Self {
            code_verifier,
            code_challenge,
            code_challenge_method: CodeChallengeMethod::S256,
        })
    }
}
