//! Short-lived upstream credentials minted from a caller's composite key.
//!
//! The token is a compact HS256 JWS whose header carries the non-standard
//! `sign_type: "SIGN"` marker the upstream expects.

use std::fmt::{Debug, Formatter};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const KEY_SEPARATOR: char = '.';
const SIGNATURE_ALGORITHM: &str = "HS256";
const TOKEN_TYPE: &str = "JWT";
const SIGN_TYPE: &str = "SIGN";
const EXPIRY_MULTIPLIER: i64 = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("api key must have the form `id.secret`")]
    MalformedKey,
    #[error("expiry `{0}` is not an integer")]
    InvalidExpiry(String),
    #[error("expiry `{0}` overflows the token clock")]
    ExpiryOverflow(i64),
    #[error("failed to sign credential: {0}")]
    Signing(String),
}

/// Caller-supplied `id.secret` pair.
#[derive(Clone, PartialEq, Eq)]
pub struct CompositeKey {
    id: String,
    secret: String,
}

impl CompositeKey {
    /// Split on `.` into exactly two non-empty segments.
    pub fn parse(raw: &str) -> Result<Self, CredentialError> {
        let mut parts = raw.split(KEY_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(id), Some(secret), None) if !id.is_empty() && !secret.is_empty() => Ok(Self {
                id: id.to_string(),
                secret: secret.to_string(),
            }),
            _ => Err(CredentialError::MalformedKey),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl Debug for CompositeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeKey")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Parse the caller's string-encoded expiry.
pub fn parse_expiry(raw: &str) -> Result<i64, CredentialError> {
    raw.parse::<i64>()
        .map_err(|_| CredentialError::InvalidExpiry(raw.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialClaims {
    pub api_key: String,
    pub exp: i64,
    pub timestamp: i64,
}

#[derive(Serialize)]
struct JwsHeader {
    alg: &'static str,
    sign_type: &'static str,
    typ: &'static str,
}

/// A signed token ready for the upstream `Authorization` header.
#[derive(Clone)]
pub struct SignedCredential {
    pub claims: CredentialClaims,
    token: String,
}

impl SignedCredential {
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Debug for SignedCredential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedCredential")
            .field("claims", &self.claims)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Mint a credential for `issuer_id`, signed with `secret`.
///
/// `exp` is `now_unix + expiry_seconds * 1000` while `timestamp` stays in
/// seconds; the upstream contract for this mix is unconfirmed.
pub fn mint(
    issuer_id: &str,
    secret: &str,
    now_unix: i64,
    expiry_seconds: i64,
) -> Result<SignedCredential, CredentialError> {
    let exp = expiry_seconds
        .checked_mul(EXPIRY_MULTIPLIER)
        .and_then(|scaled| now_unix.checked_add(scaled))
        .ok_or(CredentialError::ExpiryOverflow(expiry_seconds))?;

    let claims = CredentialClaims {
        api_key: issuer_id.to_string(),
        exp,
        timestamp: now_unix,
    };
    let header = JwsHeader {
        alg: SIGNATURE_ALGORITHM,
        sign_type: SIGN_TYPE,
        typ: TOKEN_TYPE,
    };

    let signing_input = format!(
        "{}.{}",
        encode_segment(&header)?,
        encode_segment(&claims)?
    );

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| CredentialError::Signing(err.to_string()))?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(SignedCredential {
        claims,
        token: format!("{signing_input}.{signature}"),
    })
}

/// Validate the raw composite key and expiry, then mint.
pub fn mint_from_key(
    api_key: &str,
    expiry_seconds: &str,
    now_unix: i64,
) -> Result<SignedCredential, CredentialError> {
    let key = CompositeKey::parse(api_key)?;
    let expiry = parse_expiry(expiry_seconds)?;
    mint(key.id(), key.secret(), now_unix, expiry)
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, CredentialError> {
    let json = serde_json::to_vec(value).map_err(|err| CredentialError::Signing(err.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

#[cfg(test)]
mod tests {
    use super::*;

    use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct DecodedClaims {
        api_key: String,
        exp: i64,
        timestamp: i64,
    }

    fn decode_segment(segment: &str) -> serde_json::Value {
        let bytes = URL_SAFE_NO_PAD.decode(segment).expect("base64url segment");
        serde_json::from_slice(&bytes).expect("json segment")
    }

    #[test]
    fn composite_key_requires_two_non_empty_segments() {
        let key = CompositeKey::parse("abc.def").expect("valid key");
        assert_eq!(key.id(), "abc");
        assert_eq!(key.secret(), "def");

        for raw in ["", "abc", "abc.", ".def", "a.b.c", ".", "..", "abc..def"] {
            assert_eq!(
                CompositeKey::parse(raw),
                Err(CredentialError::MalformedKey),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn debug_output_redacts_secret() {
        let key = CompositeKey::parse("abc.topsecret").expect("valid key");
        let rendered = format!("{key:?}");
        assert!(rendered.contains("abc"));
        assert!(!rendered.contains("topsecret"));
    }

    #[test]
    fn expiry_must_be_an_integer() {
        assert_eq!(parse_expiry("60"), Ok(60));
        assert_eq!(parse_expiry("-5"), Ok(-5));
        for raw in ["", "sixty", "6.0", " 60", "60s"] {
            assert_eq!(
                parse_expiry(raw),
                Err(CredentialError::InvalidExpiry(raw.to_string()))
            );
        }
    }

    #[test]
    fn claims_follow_reference_arithmetic() {
        let credential = mint("abc", "def", 1_700_000_000, 60).expect("minted");
        assert_eq!(
            credential.claims,
            CredentialClaims {
                api_key: "abc".into(),
                exp: 1_700_000_000 + 60_000,
                timestamp: 1_700_000_000,
            }
        );
    }

    #[test]
    fn header_carries_sign_type_marker() {
        let credential = mint("abc", "def", 1_700_000_000, 60).expect("minted");
        let header_segment = credential.token().split('.').next().expect("header");
        let header = decode_segment(header_segment);
        assert_eq!(header["alg"], "HS256");
        assert_eq!(header["typ"], "JWT");
        assert_eq!(header["sign_type"], "SIGN");
    }

    #[test]
    fn token_verifies_with_secret_half_of_key() {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let credential = mint_from_key("abc.def", "60", now).expect("minted");

        let header = decode_header(credential.token()).expect("header decodes");
        assert_eq!(header.alg, Algorithm::HS256);

        let decoded = decode::<DecodedClaims>(
            credential.token(),
            &DecodingKey::from_secret(b"def"),
            &Validation::new(Algorithm::HS256),
        )
        .expect("signature verifies");
        assert_eq!(decoded.claims.api_key, "abc");
        assert_eq!(decoded.claims.timestamp, now);
        assert_eq!(decoded.claims.exp, now + 60_000);
    }

    #[test]
    fn token_rejects_wrong_secret() {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let credential = mint_from_key("abc.def", "60", now).expect("minted");
        let result = decode::<DecodedClaims>(
            credential.token(),
            &DecodingKey::from_secret(b"not-def"),
            &Validation::new(Algorithm::HS256),
        );
        assert!(result.is_err());
    }

    #[test]
    fn overflowing_expiry_is_rejected() {
        assert_eq!(
            mint("abc", "def", 1_700_000_000, i64::MAX / 10).map(|c| c.claims),
            Err(CredentialError::ExpiryOverflow(i64::MAX / 10))
        );
    }

    #[test]
    fn mint_from_key_checks_key_before_expiry() {
        assert_eq!(
            mint_from_key("no-separator", "not-a-number", 0).map(|c| c.claims),
            Err(CredentialError::MalformedKey)
        );
        assert_eq!(
            mint_from_key("abc.def", "not-a-number", 0).map(|c| c.claims),
            Err(CredentialError::InvalidExpiry("not-a-number".into()))
        );
    }
}
