//! Content addressing for published artifacts.
//!
//! A fingerprint is the lowercase hex MD5 digest of the exact bytes of a user
//! message. It only names files; nothing relies on it for integrity or
//! authentication.

use std::fmt::{Display, Formatter};

use md5::{Digest, Md5};
use thiserror::Error;

const FINGERPRINT_HEX_LEN: usize = 32;
pub const ARTIFACT_EXTENSION: &str = "png";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("fingerprint must be {FINGERPRINT_HEX_LEN} lowercase hex characters")]
    Malformed,
}

/// Deterministic digest of a message, used as the artifact file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint the byte-exact contents of `text`.
    pub fn of(text: &str) -> Self {
        let digest = Md5::digest(text.as_bytes());
        Self(hex::encode(digest))
    }

    /// Accept a previously produced fingerprint, e.g. from a request path.
    pub fn parse(value: &str) -> Result<Self, FingerprintError> {
        let well_formed = value.len() == FINGERPRINT_HEX_LEN
            && value
                .bytes()
                .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte));
        if !well_formed {
            return Err(FingerprintError::Malformed);
        }
        Ok(Self(value.to_string()))
    }

    /// Parse an artifact file name of the form `<fingerprint>.png`.
    pub fn from_file_name(file_name: &str) -> Result<Self, FingerprintError> {
        let stem = file_name
            .strip_suffix(ARTIFACT_EXTENSION)
            .and_then(|rest| rest.strip_suffix('.'))
            .ok_or(FingerprintError::Malformed)?;
        Self::parse(stem)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> String {
        format!("{}.{ARTIFACT_EXTENSION}", self.0)
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Convenience wrapper returning the bare hex digest.
pub fn fingerprint(text: &str) -> String {
    Fingerprint::of(text).0
}
