//! JSON Schema validation (C2).
//!
//! A thin, pure wrapper around `jsonschema`: no I/O, deterministic, and
//! side-effect free, per the "Validation is pure" testable property.

use jsonschema::Validator;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Validate `value` against `schema`, returning a human-readable description
/// on failure. A malformed schema is a programming error at endpoint
/// declaration time, not a request-time failure, so it panics — the same way
/// a bad route table would.
pub fn validate(value: &Value, schema: &Value) -> Result<(), ValidationError> {
    let validator = Validator::new(schema).expect("endpoint JSON Schema must be valid");

    match validator.validate(value) {
        Ok(()) => Ok(()),
        Err(error) => Err(ValidationError(error.to_string())),
    }
}
