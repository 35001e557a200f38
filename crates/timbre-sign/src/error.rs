//! # Signing Error Types
//!
//! Error types for CAF parsing and TED signing.
//!
//! Every variant here is fatal to the current issuance: there is no
//! degraded mode in which a document goes out unsigned or placeholder-signed.

use thiserror::Error;

/// Result type alias for signing operations.
pub type SignResult<T> = Result<T, SignError>;

/// Signing and CAF parsing errors.
#[derive(Debug, Error)]
pub enum SignError {
    /// The CAF structure could not be parsed.
    #[error("CAF parse error: {0}")]
    CafParse(String),

    /// A required CAF field is missing.
    #[error("CAF is missing field <{field}>")]
    MissingField { field: String },

    /// The CAF folio range is inverted or empty.
    #[error("CAF range is invalid: D={from}, H={to}")]
    InvalidRange { from: i64, to: i64 },

    /// The CAF covers a different document type than requested.
    #[error("CAF type mismatch: CAF covers type {caf_type}, requested {requested}")]
    TypeMismatch { caf_type: u32, requested: u32 },

    /// The private key embedded in the CAF could not be extracted or parsed.
    ///
    /// ## Fail-Closed
    /// Issuance aborts. A CAF whose key does not parse must be rejected at
    /// load time, never worked around.
    #[error("CAF key extraction failed: {0}")]
    KeyExtraction(String),

    /// The cryptographic signing step failed.
    #[error("TED signing failed: {0}")]
    SigningFailed(String),

    /// Signature verification failed (tampered DD or wrong key).
    #[error("TED signature verification failed: {0}")]
    VerificationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SignError::TypeMismatch {
            caf_type: 39,
            requested: 33,
        };
        assert_eq!(
            err.to_string(),
            "CAF type mismatch: CAF covers type 39, requested 33"
        );
    }
}
