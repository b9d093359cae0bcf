//! Inbound relay payload and its field-level validation.

use serde_json::{Map, Value};
use thiserror::Error;

pub const FIELD_API_KEY: &str = "apikey";
pub const FIELD_MESSAGE: &str = "message";
pub const FIELD_EXPIRY: &str = "exp";
pub const FIELD_EXPIRY_FALLBACK: &str = "exp_seconds";
pub const FIELD_MODEL: &str = "model";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("request body is not valid JSON: {0}")]
    NotJson(String),
    #[error("request body must be a JSON object")]
    NotObject,
    #[error("field `{0}` is missing or not a string")]
    MissingField(&'static str),
}

/// A relay request with every required field present.
///
/// The composite key and expiry stay as the caller sent them; their structure
/// is checked when the credential is minted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    pub api_key: String,
    pub message: String,
    pub expiry_seconds: String,
    pub model: String,
}

impl InboundRequest {
    /// Parse and validate a raw request body.
    pub fn from_body(body: &[u8]) -> Result<Self, InputError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|err| InputError::NotJson(err.to_string()))?;
        match value {
            Value::Object(fields) => Self::from_fields(&fields),
            _ => Err(InputError::NotObject),
        }
    }

    fn from_fields(fields: &Map<String, Value>) -> Result<Self, InputError> {
        let api_key = string_field(fields, FIELD_API_KEY)?;
        let message = string_field(fields, FIELD_MESSAGE)?;
        let expiry_seconds = string_field(fields, FIELD_EXPIRY)
            .or_else(|_| string_field(fields, FIELD_EXPIRY_FALLBACK))
            .map_err(|_| InputError::MissingField(FIELD_EXPIRY))?;
        let model = string_field(fields, FIELD_MODEL)?;

        Ok(Self {
            api_key,
            message,
            expiry_seconds,
            model,
        })
    }
}

fn string_field(fields: &Map<String, Value>, name: &'static str) -> Result<String, InputError> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(InputError::MissingField(name))
}
