//! Secure random token generation.

use base64::Engine;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::BASE64URL;
use crate::error::{IdentityError, IdentityResult};

/// Number of random bytes behind a token; encodes to 43 base64url characters.
const TOKEN_BYTES: usize = 32;

/// Fill `buf` from the operating system's secure random source.
///
/// Never falls back to a weaker generator: if the OS source is unavailable
/// the call fails with [`IdentityError::NoCryptoSource`].
pub fn fill_random(buf: &mut [u8]) -> IdentityResult<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| IdentityError::NoCryptoSource(e.to_string()))
}

/// Generate a 43 character base64url token from 32 secure random bytes.
///
/// Suitable for both the OAuth2 `state` parameter and a PKCE `code_verifier`.
pub fn generate_random_token() -> IdentityResult<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    fill_random(&mut bytes)?;
    Ok(BASE64URL.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_token_shape() {
        let token = generate_random_token().unwrap();

        assert_eq!(token.len(), 43);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert!(!token.contains('='));
    }

    #[test]
    fn test_random_tokens_are_unique() {
        let tokens: HashSet<String> = (0..64)
            .map(|_| generate_random_token().unwrap())
            .collect();
        assert_eq!(tokens.len(), 64);
    }

    #[test]
    fn test_fill_random_overwrites_buffer() {
        let mut buf = [0u8; 64];
        fill_random(&mut buf).unwrap();
        assert!(buf.iter().any(|b| *b != 0));
    }
}
