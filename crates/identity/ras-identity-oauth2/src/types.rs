//! OAuth2 protocol types.

use ras_identity_core::{IdentityResult, decode_id_token};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// OAuth2 token response
///
/// Provider specific fields, such as Entra ID's `ext_expires_in`, end up in
/// `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Some servers send this as a string; unreadable values are treated as absent.
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenResponse {
    /// Claims of the `id_token`, if one was issued. The signature is not verified.
    pub fn id_token_claims(&self) -> IdentityResult<Option<Map<String, Value>>> {
        self.id_token.as_deref().map(decode_id_token).transpose()
    }
}

fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
        Other(Value),
    }

    Ok(match Option::<Seconds>::deserialize(deserializer)? {
        Some(Seconds::Number(seconds)) => Some(seconds),
        Some(Seconds::Text(text)) => text.trim().parse().ok(),
        Some(Seconds::Other(_)) | None => None,
    })
}

/// OAuth2 error response body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuth2ErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_uri: Option<String>,
    /// Details about the user session, sent by some first-party flows
    #[serde(default)]
    pub auth_session: Option<Value>,
}
