//! Body checksum verification.
//!
//! The digest is SHA-256 over the raw request body bytes, exactly as sent.
//! The body must still parse as JSON; a client hashes the bytes it puts on
//! the wire, whatever its key order or whitespace.
//!
//! This guards against corruption in transit, not forgery. The hex digests
//! are compared as plain strings; constant-time comparison is unnecessary.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::IntegrityError;

/// Lowercase hex SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Check a raw request body against the caller-supplied checksum header.
/// Returns the parsed body on success.
pub fn verify(body: &[u8], supplied: Option<&str>) -> Result<Value, IntegrityError> {
    let supplied = supplied
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(IntegrityError::MissingChecksum)?;

    let value: Value =
        serde_json::from_slice(body).map_err(|e| IntegrityError::MalformedBody(e.to_string()))?;

    let expected = digest(body);
    if !expected.eq_ignore_ascii_case(supplied) {
        return Err(IntegrityError::Mismatch {
            expected,
            supplied: supplied.to_string(),
        });
    }
    Ok(value)
}

impl IntegrityError {
    /// Stable tag for log events and the failure metric.
    pub fn event(&self) -> &'static str {
        match self {
            IntegrityError::MissingChecksum => "integrity.missing_checksum",
            IntegrityError::MalformedBody(_) => "integrity.malformed_body",
            IntegrityError::Mismatch { .. } => "integrity.mismatch",
        }
    }
}
