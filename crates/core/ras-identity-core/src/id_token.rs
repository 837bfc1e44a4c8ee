//! Read-only inspection of OpenID Connect id tokens.

use base64::Engine;
use serde_json::{Map, Value};

use crate::BASE64URL;
use crate::error::{IdentityError, IdentityResult};

/// Decode the claims of a compact JWS `id_token` without verifying its signature.
///
/// Only use this on tokens received directly from the provider's token
/// endpoint over TLS; the claims are not authenticated here.
pub fn decode_id_token(id_token: &str) -> IdentityResult<Map<String, Value>> {
    let mut parts = id_token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(IdentityError::TokenDecode(
            "expected three dot-separated parts".to_string(),
        ));
    };

    let bytes = BASE64URL
        .decode(payload.trim_end_matches('='))
        .map_err(|e| IdentityError::TokenDecode(e.to_string()))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(claims)) => Ok(claims),
        Ok(_) => Err(IdentityError::TokenDecode(
            "claims are not a JSON object".to_string(),
        )),
        Err(e) => Err(IdentityError::TokenDecode(e.to_string())),
    }
}
