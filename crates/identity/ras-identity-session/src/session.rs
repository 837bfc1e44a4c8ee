//! Stateless sessions carried in an encrypted cookie.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::SessionOptions;
use crate::cookie::{CookieAttributes, SessionCookie};
use crate::error::{SessionError, SessionResult};
use crate::jwe;

/// Claims set by the codec on every encode; callers never supply them.
pub const IMMUTABLE_CLAIMS: [&str; 3] = ["iat", "exp", "jti"];
/// Registered claims a caller may set through [`MutableClaims`].
pub const MUTABLE_CLAIMS: [&str; 4] = ["iss", "aud", "nbf", "sub"];

/// `aud` claim: one audience or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

/// Registered claims the caller may set when creating a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutableClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Session contents being assembled by a [`SessionManager::create_session`] builder.
#[derive(Debug, Clone, Default)]
pub struct SessionDraft {
    /// User claims; must not be empty
    pub session: Map<String, Value>,
    pub token: MutableClaims,
}

impl SessionDraft {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.session.insert(key.into(), value.into());
        self
    }
}

/// Token claims of a validated session.
///
/// `iat`, `exp` and `jti` are always present; the others only when the
/// session was created with them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub iss: Option<String>,
    pub aud: Option<Audience>,
    pub nbf: Option<i64>,
    pub sub: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub user: Map<String, Value>,
    /// ISO-8601 expiry derived from `exp`
    pub expires: String,
}

/// A validated session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session: SessionInfo,
    pub token: TokenClaims,
}

impl SessionRecord {
    fn from_claims(mut claims: Map<String, Value>) -> SessionResult<Self> {
        let exp = take_claim::<i64>(&mut claims, "exp")?.ok_or_else(|| missing("exp"))?;
        let iat = take_claim::<i64>(&mut claims, "iat")?.ok_or_else(|| missing("iat"))?;
        let jti = take_claim::<String>(&mut claims, "jti")?.ok_or_else(|| missing("jti"))?;

        let token = TokenClaims {
            iat,
            exp,
            jti,
            iss: take_claim(&mut claims, "iss")?,
            aud: take_claim(&mut claims, "aud")?,
            nbf: take_claim(&mut claims, "nbf")?,
            sub: take_claim(&mut claims, "sub")?,
        };

        let expires = DateTime::<Utc>::from_timestamp(exp, 0)
            .ok_or_else(|| SessionError::MalformedToken(format!("\"exp\" out of range: {exp}")))?
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        Ok(Self {
            session: SessionInfo {
                user: claims,
                expires,
            },
            token,
        })
    }

    /// Deserialize the user claims into a caller type.
    pub fn user_as<T: DeserializeOwned>(&self) -> SessionResult<T> {
        Ok(serde_json::from_value(Value::Object(self.session.user.clone()))?)
    }
}

fn take_claim<T: DeserializeOwned>(
    claims: &mut Map<String, Value>,
    name: &str,
) -> SessionResult<Option<T>> {
    match claims.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| SessionError::MalformedToken(format!("\"{name}\" claim: {e}"))),
    }
}

fn missing(name: &str) -> SessionError {
    SessionError::MalformedToken(format!("missing \"{name}\" claim"))
}

/// Errors meaning "this request carries no valid session"
fn is_unauthenticated(error: &SessionError) -> bool {
    matches!(
        error,
        SessionError::MalformedToken(_)
            | SessionError::UnsupportedAlgorithm(_)
            | SessionError::InvalidToken
            | SessionError::Expired
            | SessionError::NotYetValid
            | SessionError::Serialization(_)
    )
}

/// Creates and validates session cookies.
///
/// Holds only immutable configuration, so one instance can serve any number
/// of concurrent requests.
#[derive(Debug, Clone)]
pub struct SessionManager {
    options: SessionOptions,
    cookie: CookieAttributes,
}

impl SessionManager {
    /// Validate `options` and resolve the cookie attributes once.
    pub fn new(options: SessionOptions) -> SessionResult<Self> {
        if options.secret.is_incomplete() {
            return Err(SessionError::MissingSecret);
        }
        if options.cookie_name.is_empty() {
            return Err(SessionError::MissingCookieName);
        }
        let latest_exp = i64::try_from(options.max_age)
            .ok()
            .and_then(|max_age| Utc::now().timestamp().checked_add(max_age))
            .and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0));
        if latest_exp.is_none() {
            return Err(SessionError::InvalidMaxAge(options.max_age));
        }

        let cookie =
            CookieAttributes::resolve(&options.cookie, options.max_age, options.deployment);
        Ok(Self { options, cookie })
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn cookie_name(&self) -> &str {
        &self.options.cookie_name
    }

    /// A cookie with an empty value, for clearing a session or looking up its name.
    pub fn create_blank_session(&self) -> SessionCookie {
        self.cookie(String::new())
    }

    /// Build a session with `build` and encrypt it into a cookie.
    ///
    /// ```ignore
    /// let cookie = manager.create_session(|draft| {
    ///     draft.insert("id", user.id).insert("email", user.email.clone());
    ///     draft.token.sub = Some(user.id.to_string());
    /// })?;
    /// ```
    pub fn create_session<F>(&self, build: F) -> SessionResult<SessionCookie>
    where
        F: FnOnce(&mut SessionDraft),
    {
        let mut draft = SessionDraft::default();
        build(&mut draft);
        self.seal(draft)
    }

    /// Create a session from a serializable user value.
    pub fn create_session_from<T: Serialize>(
        &self,
        user: &T,
        token: MutableClaims,
    ) -> SessionResult<SessionCookie> {
        let session = match serde_json::to_value(user)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                let message = "session data must serialize to a JSON object";
                return Err(serde_json::Error::custom(message).into());
            }
        };
        self.seal(SessionDraft { session, token })
    }

    fn seal(&self, draft: SessionDraft) -> SessionResult<SessionCookie> {
        if draft.session.is_empty() {
            return Err(SessionError::EmptySessionData);
        }
        let is_reserved = |key: &&String| {
            IMMUTABLE_CLAIMS.contains(&key.as_str()) || MUTABLE_CLAIMS.contains(&key.as_str())
        };
        if let Some(reserved) = draft.session.keys().find(is_reserved) {
            return Err(SessionError::ReservedClaim(reserved.clone()));
        }

        let mut claims = draft.session;
        if let Value::Object(registered) = serde_json::to_value(&draft.token)? {
            claims.extend(registered);
        }

        let token = jwe::encode(
            self.options.secret.as_slice(),
            &self.options.salt,
            self.options.max_age,
            claims,
        )?;
        debug!(cookie = %self.options.cookie_name, "Created session");

        Ok(self.cookie(token))
    }

    /// Decrypt and unpack a session token.
    ///
    /// An empty, malformed, tampered or expired token yields `Ok(None)`: the
    /// request is simply not authenticated. A token that no configured secret
    /// can open returns [`SessionError::KeyMismatch`], which usually points at
    /// a secret rotation mistake.
    pub fn validate_session(&self, token: &str) -> SessionResult<Option<SessionRecord>> {
        let outcome = jwe::decode(self.options.secret.as_slice(), &self.options.salt, token)
            .and_then(|claims| claims.map(SessionRecord::from_claims).transpose());

        match outcome {
            Err(error) if is_unauthenticated(&error) => {
                warn!(reason = %error, "Rejected session token");
                Ok(None)
            }
            other => other,
        }
    }

    fn cookie(&self, value: String) -> SessionCookie {
        SessionCookie {
            name: self.options.cookie_name.clone(),
            value,
            options: self.cookie.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CookieOptions, DEFAULT_MAX_AGE, Deployment, Priority, SameSite, SecretSet};
    use crate::jwe::MAX_TOKEN_BYTES;
    use serde_json::json;

    fn options() -> SessionOptions {
        SessionOptions::new("secret_000", "session").with_deployment(Deployment::Development)
    }

    fn manager() -> SessionManager {
        SessionManager::new(options()).unwrap()
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u64,
        name: String,
    }

    #[test]
    fn test_configuration_errors() {
        let err = SessionManager::new(SessionOptions::new("", "session")).unwrap_err();
        assert!(matches!(err, SessionError::MissingSecret));
        assert!(err.is_configuration_error());

        let err = SessionManager::new(SessionOptions::new(SecretSet::default(), "session"))
            .unwrap_err();
        assert!(matches!(err, SessionError::MissingSecret));

        let err = SessionManager::new(SessionOptions::new("secret_000", "")).unwrap_err();
        assert!(matches!(err, SessionError::MissingCookieName));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_configuration_errors_from_deserialized_options() {
        let options: SessionOptions =
            serde_json::from_value(json!({ "secret": "secret_000" })).unwrap();
        assert!(matches!(
            SessionManager::new(options),
            Err(SessionError::MissingCookieName)
        ));
    }

    #[test]
    fn test_blank_session_defaults() {
        let cookie = manager().create_blank_session();

        assert_eq!(cookie.name, "session");
        assert_eq!(cookie.value, "");
        assert!(cookie.options.http_only);
        assert!(!cookie.options.secure);
        assert_eq!(cookie.options.same_site, SameSite::Lax);
        assert_eq!(cookie.options.path, "/");
        assert_eq!(cookie.options.max_age, DEFAULT_MAX_AGE);
    }

    #[test]
    fn test_cookie_overrides_and_max_age() {
        let manager = SessionManager::new(
            options()
                .with_max_age(3600)
                .with_cookie(
                    CookieOptions::default()
                        .with_same_site(SameSite::Strict)
                        .with_priority(Priority::High)
                        .with_secure(true),
                ),
        )
        .unwrap();

        let cookie = manager
            .create_session(|draft| {
                draft.insert("name", "John Doe");
            })
            .unwrap();

        assert_eq!(cookie.options.max_age, 3600);
        assert_eq!(cookie.options.same_site, SameSite::Strict);
        assert_eq!(cookie.options.priority, Some(Priority::High));
        assert!(cookie.options.secure);
        assert!(cookie.options.http_only);
        assert_eq!(manager.create_blank_session().options, cookie.options);
    }

    #[test]
    fn test_empty_session_data_is_rejected() {
        let err = manager().create_session(|_| {}).unwrap_err();
        assert!(matches!(err, SessionError::EmptySessionData));

        // Registered claims alone are not session data
        let err = manager()
            .create_session(|draft| draft.token.sub = Some("user-1".to_string()))
            .unwrap_err();
        assert!(matches!(err, SessionError::EmptySessionData));
    }

    #[test]
    fn test_reserved_claims_are_rejected() {
        for name in ["exp", "jti", "sub"] {
            let err = manager()
                .create_session(|draft| {
                    draft.insert("name", "John Doe").insert(name, 1);
                })
                .unwrap_err();
            assert!(matches!(err, SessionError::ReservedClaim(claim) if claim == name));
        }
    }

    #[test]
    fn test_create_and_validate_session() {
        let manager = manager();
        let before = Utc::now().timestamp();

        let cookie = manager
            .create_session(|draft| {
                draft
                    .insert("id", 42)
                    .insert("name", "John Doe")
                    .insert("email", "johndoe@example.com");
                draft.token.sub = Some("user-42".to_string());
                draft.token.aud = Some(Audience::Many(vec!["web".into(), "api".into()]));
            })
            .unwrap();

        assert_eq!(cookie.name, "session");
        assert_eq!(cookie.value.split('.').count(), 5);

        let record = manager.validate_session(&cookie.value).unwrap().unwrap();

        assert_eq!(
            Value::Object(record.session.user.clone()),
            json!({"id": 42, "name": "John Doe", "email": "johndoe@example.com"})
        );
        assert_eq!(record.token.sub.as_deref(), Some("user-42"));
        assert_eq!(
            record.token.aud,
            Some(Audience::Many(vec!["web".to_string(), "api".to_string()]))
        );
        assert_eq!(record.token.iss, None);
        assert_eq!(record.token.nbf, None);
        assert!(record.token.iat >= before);
        assert_eq!(record.token.exp, record.token.iat + DEFAULT_MAX_AGE as i64);
        assert!(!record.token.jti.is_empty());
    }

    #[test]
    fn test_expires_is_iso_8601() {
        let manager = manager();
        let cookie = manager
            .create_session(|draft| {
                draft.insert("name", "John Doe");
            })
            .unwrap();
        let record = manager.validate_session(&cookie.value).unwrap().unwrap();

        let expires = DateTime::parse_from_rfc3339(&record.session.expires).unwrap();
        assert_eq!(expires.timestamp(), record.token.exp);
        assert!(record.session.expires.ends_with(".000Z"));
    }

    #[test]
    fn test_typed_session_round_trip() {
        let manager = manager();
        let user = User {
            id: 7,
            name: "Jane".to_string(),
        };

        let cookie = manager
            .create_session_from(
                &user,
                MutableClaims {
                    iss: Some("https://auth.example.com".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        let record = manager.validate_session(&cookie.value).unwrap().unwrap();

        assert_eq!(record.user_as::<User>().unwrap(), user);
        assert_eq!(record.token.iss.as_deref(), Some("https://auth.example.com"));
    }

    #[test]
    fn test_create_session_from_non_object_fails() {
        let err = manager()
            .create_session_from(&"just a string", MutableClaims::default())
            .unwrap_err();
        assert!(matches!(err, SessionError::Serialization(_)));
    }

    #[test]
    fn test_payload_too_large_propagates() {
        let err = manager()
            .create_session(|draft| {
                draft.insert("blob", "x".repeat(MAX_TOKEN_BYTES));
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::PayloadTooLarge { .. }));
    }

    #[test]
    fn test_absent_token_is_no_session() {
        assert!(manager().validate_session("").unwrap().is_none());
    }

    #[test]
    fn test_invalid_tokens_are_no_session() {
        let manager = manager();
        let cookie = manager
            .create_session(|draft| {
                draft.insert("name", "John Doe");
            })
            .unwrap();

        let mut tampered = cookie.value.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });

        for token in ["garbage", "a.b.c.d.e", tampered.as_str()] {
            assert!(manager.validate_session(token).unwrap().is_none(), "{token}");
        }
    }

    #[test]
    fn test_tampered_token_without_key_id_is_no_session() {
        use base64::Engine;
        use ras_identity_core::BASE64URL;

        let manager = manager();
        let cookie = manager
            .create_session(|draft| {
                draft.insert("name", "John Doe");
            })
            .unwrap();

        let mut parts: Vec<String> = cookie.value.split('.').map(String::from).collect();
        let mut tag = BASE64URL.decode(&parts[4]).unwrap();
        tag[0] ^= 0x01;
        parts[4] = BASE64URL.encode(&tag);
        parts[0] = BASE64URL.encode(r#"{"alg":"dir","enc":"A256CBC-HS512"}"#);

        assert!(
            manager
                .validate_session(&parts.join("."))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_max_age_out_of_range() {
        for max_age in [u64::MAX, i64::MAX as u64, 9_000_000_000_000] {
            let err = SessionManager::new(options().with_max_age(max_age)).unwrap_err();
            assert!(matches!(err, SessionError::InvalidMaxAge(age) if age == max_age));
            assert!(err.is_configuration_error());
        }

        let century = 100 * 365 * 24 * 60 * 60;
        let manager = SessionManager::new(options().with_max_age(century)).unwrap();
        let cookie = manager
            .create_session(|draft| {
                draft.insert("name", "John Doe");
            })
            .unwrap();
        assert!(manager.validate_session(&cookie.value).unwrap().is_some());
    }

    #[test]
    fn test_rotation_and_key_mismatch() {
        let old = SessionManager::new(SessionOptions::new("secret_000", "session")).unwrap();
        let rotated =
            SessionManager::new(SessionOptions::new(["secret_100", "secret_000"], "session"))
                .unwrap();
        let unrelated = SessionManager::new(SessionOptions::new("secret_200", "session")).unwrap();

        let cookie = old
            .create_session(|draft| {
                draft.insert("name", "John Doe");
            })
            .unwrap();

        assert!(rotated.validate_session(&cookie.value).unwrap().is_some());
        assert!(matches!(
            unrelated.validate_session(&cookie.value),
            Err(SessionError::KeyMismatch)
        ));
    }

    #[test]
    fn test_salt_must_match() {
        let salted = SessionManager::new(options().with_salt("salt_000")).unwrap();
        let cookie = salted
            .create_session(|draft| {
                draft.insert("name", "John Doe");
            })
            .unwrap();

        assert!(salted.validate_session(&cookie.value).unwrap().is_some());
        assert!(matches!(
            manager().validate_session(&cookie.value),
            Err(SessionError::KeyMismatch)
        ));
    }
}
