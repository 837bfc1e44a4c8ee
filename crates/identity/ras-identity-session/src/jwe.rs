//! Compact JWE codec for session claims.
//!
//! Tokens use direct key agreement (`alg: "dir"`) with `A256CBC-HS512`
//! content encryption (RFC 7518 §5.2.5). The 64 byte content key is derived
//! from a secret and a salt with HKDF-SHA256, and its RFC 7638 thumbprint is
//! written to the `kid` header so a decoder holding several secrets can pick
//! the right one without trial decryption.
//!
//! Compact form: `header..iv.ciphertext.tag` (the encrypted key part is
//! always empty for `dir`).

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use chrono::Utc;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use ras_identity_core::{BASE64URL, fill_random};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256, Sha512};
use tracing::debug;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{SessionError, SessionResult};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha512 = Hmac<Sha512>;

/// Key management algorithm: the derived key is the content encryption key.
pub const ALG: &str = "dir";
/// Content encryption algorithm.
pub const ENC: &str = "A256CBC-HS512";
/// Browsers drop cookies larger than this.
pub const MAX_TOKEN_BYTES: usize = 4096;
/// Allowed clock skew, in seconds, for `exp`, `nbf` and `iat` checks.
pub const CLOCK_TOLERANCE_SECS: i64 = 15;

const KEY_LEN: usize = 64;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 32;

/// JWE protected header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedHeader {
    pub alg: String,
    pub enc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// Content encryption key derived from one secret. Wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
    #[zeroize(skip)]
    thumbprint: String,
}

impl DerivedKey {
    /// Derive the key for `(secret, salt)`. Deterministic for the same inputs.
    pub fn derive(secret: &str, salt: &str) -> SessionResult<Self> {
        let info = format!("ras-identity-session encryption key [{ENC}, {salt}, sha256]");
        let hk = Hkdf::<Sha256>::new(Some(salt.as_bytes()), secret.as_bytes());

        let mut bytes = [0u8; KEY_LEN];
        hk.expand(info.as_bytes(), &mut bytes)
            .map_err(|e| SessionError::KeyDerivation(e.to_string()))?;

        let thumbprint = jwk_thumbprint(&bytes);
        Ok(Self { bytes, thumbprint })
    }

    /// RFC 7638 thumbprint of the key's `oct` JWK.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    fn mac_key(&self) -> &[u8] {
        &self.bytes[..KEY_LEN / 2]
    }

    fn enc_key(&self) -> &[u8] {
        &self.bytes[KEY_LEN / 2..]
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("thumbprint", &self.thumbprint)
            .finish_non_exhaustive()
    }
}

/// Members in lexicographic order, as required for the thumbprint input.
/// The digest size follows the key size (512 bits).
fn jwk_thumbprint(key: &[u8]) -> String {
    let jwk = format!(r#"{{"k":"{}","kty":"oct"}}"#, BASE64URL.encode(key));
    BASE64URL.encode(Sha512::digest(jwk.as_bytes()))
}

/// Encrypt `claims` with the first secret.
///
/// Sets `iat`, `exp` (`iat + max_age`) and a fresh `jti`, overwriting any
/// caller values for those claims.
pub fn encode(
    secrets: &[String],
    salt: &str,
    max_age: u64,
    claims: Map<String, Value>,
) -> SessionResult<String> {
    encode_at(secrets, salt, max_age, claims, Utc::now().timestamp())
}

fn encode_at(
    secrets: &[String],
    salt: &str,
    max_age: u64,
    mut claims: Map<String, Value>,
    now: i64,
) -> SessionResult<String> {
    let secret = secrets.first().ok_or(SessionError::MissingSecret)?;
    let key = DerivedKey::derive(secret, salt)?;

    let max_age = i64::try_from(max_age).unwrap_or(i64::MAX);
    claims.insert("iat".to_string(), Value::from(now));
    claims.insert("exp".to_string(), Value::from(now.saturating_add(max_age)));
    claims.insert("jti".to_string(), Value::from(Uuid::new_v4().to_string()));

    let header = ProtectedHeader {
        alg: ALG.to_string(),
        enc: ENC.to_string(),
        kid: Some(key.thumbprint().to_string()),
    };

    let token = seal(&header, &claims, &key)?;
    if token.len() > MAX_TOKEN_BYTES {
        return Err(SessionError::PayloadTooLarge {
            size: token.len(),
            limit: MAX_TOKEN_BYTES,
        });
    }

    debug!(size = token.len(), "Encoded session token");
    Ok(token)
}

/// Decrypt and validate a token against every configured secret.
///
/// Returns `Ok(None)` when `token` is empty: no token is a valid "no session"
/// state, not an error.
pub fn decode(
    secrets: &[String],
    salt: &str,
    token: &str,
) -> SessionResult<Option<Map<String, Value>>> {
    decode_at(secrets, salt, token, Utc::now().timestamp())
}

fn decode_at(
    secrets: &[String],
    salt: &str,
    token: &str,
    now: i64,
) -> SessionResult<Option<Map<String, Value>>> {
    if token.is_empty() {
        return Ok(None);
    }
    if secrets.is_empty() {
        return Err(SessionError::MissingSecret);
    }

    let compact = CompactToken::parse(token)?;
    if compact.header.alg != ALG {
        return Err(SessionError::UnsupportedAlgorithm(format!(
            "alg: expected {ALG}, got {}",
            compact.header.alg
        )));
    }
    if compact.header.enc != ENC {
        return Err(SessionError::UnsupportedAlgorithm(format!(
            "enc: expected {ENC}, got {}",
            compact.header.enc
        )));
    }

    let keys = secrets
        .iter()
        .map(|secret| DerivedKey::derive(secret, salt))
        .collect::<SessionResult<Vec<_>>>()?;
    let plaintext = open_with_candidates(&keys, &compact)?;

    let claims = match serde_json::from_slice::<Value>(&plaintext)? {
        Value::Object(claims) => claims,
        _ => {
            return Err(SessionError::MalformedToken(
                "claims are not a JSON object".to_string(),
            ));
        }
    };

    validate_times(&claims, now)?;
    Ok(Some(claims))
}

/// Pick the key that opens `token`.
///
/// A key whose thumbprint equals the header `kid` is used directly. Tokens
/// without a `kid`, or whose `kid` names none of the keys, are tried against
/// each key in order. A key is only accepted once the tag verifies.
///
/// When every trial fails, a token that names a key is a
/// [`SessionError::KeyMismatch`]; an untagged one is [`SessionError::InvalidToken`],
/// since it cannot have been issued under a different secret.
fn open_with_candidates(
    keys: &[DerivedKey],
    token: &CompactToken<'_>,
) -> SessionResult<Vec<u8>> {
    let kid = token.header.kid.as_deref();
    if let Some(kid) = kid {
        if let Some((index, key)) = keys
            .iter()
            .enumerate()
            .find(|(_, key)| key.thumbprint() == kid)
        {
            debug!(index, "Session secret selected by key id");
            return token.open(key);
        }
    }

    let opened = keys
        .iter()
        .enumerate()
        .find_map(|(index, key)| token.open(key).ok().map(|plaintext| (index, plaintext)));

    match (opened, kid) {
        (Some((index, plaintext)), _) => {
            debug!(index, "Session secret selected by trial decryption");
            Ok(plaintext)
        }
        (None, Some(_)) => Err(SessionError::KeyMismatch),
        (None, None) => Err(SessionError::InvalidToken),
    }
}

fn validate_times(claims: &Map<String, Value>, now: i64) -> SessionResult<()> {
    let numeric = |name: &str| -> SessionResult<Option<i64>> {
        match claims.get(name) {
            None => Ok(None),
            Some(value) => value
                .as_i64()
                .or_else(|| value.as_f64().map(|f| f as i64))
                .map(Some)
                .ok_or_else(|| {
                    SessionError::MalformedToken(format!("\"{name}\" claim must be a number"))
                }),
        }
    };

    let exp = numeric("exp")?
        .ok_or_else(|| SessionError::MalformedToken("missing \"exp\" claim".to_string()))?;
    if exp <= now - CLOCK_TOLERANCE_SECS {
        return Err(SessionError::Expired);
    }

    for name in ["nbf", "iat"] {
        if let Some(at) = numeric(name)? {
            if at > now + CLOCK_TOLERANCE_SECS {
                return Err(SessionError::NotYetValid);
            }
        }
    }

    Ok(())
}

/// Encrypt `claims` under `header` with `key` and serialize the compact form.
fn seal(
    header: &ProtectedHeader,
    claims: &Map<String, Value>,
    key: &DerivedKey,
) -> SessionResult<String> {
    let header_b64 = BASE64URL.encode(serde_json::to_vec(header)?);
    let plaintext = serde_json::to_vec(claims)?;

    let mut iv = [0u8; IV_LEN];
    fill_random(&mut iv)?;

    let ciphertext = Aes256CbcEnc::new_from_slices(key.enc_key(), &iv)
        .map_err(|e| SessionError::KeyDerivation(e.to_string()))?
        .encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

    let tag = authenticator(key, header_b64.as_bytes(), &iv, &ciphertext)?
        .finalize()
        .into_bytes();

    Ok(format!(
        "{}..{}.{}.{}",
        header_b64,
        BASE64URL.encode(iv),
        BASE64URL.encode(&ciphertext),
        BASE64URL.encode(&tag[..TAG_LEN])
    ))
}

/// HMAC-SHA-512 over `AAD || IV || ciphertext || AL`, where AL is the AAD
/// length in bits as a 64-bit big-endian integer.
fn authenticator(
    key: &DerivedKey,
    aad: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> SessionResult<HmacSha512> {
    let mut mac = <HmacSha512 as Mac>::new_from_slice(key.mac_key())
        .map_err(|e| SessionError::KeyDerivation(e.to_string()))?;
    mac.update(aad);
    mac.update(iv);
    mac.update(ciphertext);
    mac.update(&((aad.len() as u64) * 8).to_be_bytes());
    Ok(mac)
}

/// A parsed, still encrypted, compact token.
struct CompactToken<'a> {
    header: ProtectedHeader,
    header_b64: &'a str,
    iv: Vec<u8>,
    ciphertext: Vec<u8>,
    tag: Vec<u8>,
}

impl<'a> CompactToken<'a> {
    fn parse(token: &'a str) -> SessionResult<Self> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 5 {
            return Err(SessionError::MalformedToken(format!(
                "expected 5 parts, got {}",
                parts.len()
            )));
        }
        if !parts[1].is_empty() {
            return Err(SessionError::MalformedToken(
                "direct key agreement tokens carry no encrypted key".to_string(),
            ));
        }

        let decode_part = |name: &str, part: &str| {
            BASE64URL
                .decode(part)
                .map_err(|e| SessionError::MalformedToken(format!("{name}: {e}")))
        };

        let header: ProtectedHeader = serde_json::from_slice(&decode_part("header", parts[0])?)
            .map_err(|e| SessionError::MalformedToken(format!("header: {e}")))?;
        let iv = decode_part("iv", parts[2])?;
        let ciphertext = decode_part("ciphertext", parts[3])?;
        let tag = decode_part("tag", parts[4])?;

        if iv.len() != IV_LEN {
            return Err(SessionError::MalformedToken(format!(
                "iv must be {IV_LEN} bytes, got {}",
                iv.len()
            )));
        }
        if tag.len() != TAG_LEN {
            return Err(SessionError::MalformedToken(format!(
                "tag must be {TAG_LEN} bytes, got {}",
                tag.len()
            )));
        }

        Ok(Self {
            header,
            header_b64: parts[0],
            iv,
            ciphertext,
            tag,
        })
    }

    /// Verify the tag with `key`, then decrypt.
    fn open(&self, key: &DerivedKey) -> SessionResult<Vec<u8>> {
        authenticator(key, self.header_b64.as_bytes(), &self.iv, &self.ciphertext)?
            .verify_truncated_left(&self.tag)
            .map_err(|_| SessionError::InvalidToken)?;

        Aes256CbcDec::new_from_slices(key.enc_key(), &self.iv)
            .map_err(|e| SessionError::KeyDerivation(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&self.ciphertext)
            .map_err(|_| SessionError::MalformedToken("invalid padding".to_string()))
    }
}
