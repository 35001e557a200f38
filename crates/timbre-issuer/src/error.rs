//! # Issuance Error Taxonomy
//!
//! The operator-facing error surface. Every failure mode of the pipeline
//! maps to exactly one variant here, with a clear recovery action:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────────────────────────┐
//! │ Variant              │ Recovery                                         │
//! ├──────────────────────┼──────────────────────────────────────────────────┤
//! │ NoDocumentRequired   │ None — the card voucher is the fiscal record     │
//! │ Validation           │ Fix the sale input; no folio was touched         │
//! │ FolioExhausted       │ Load a new CAF; not auto-recoverable             │
//! │ CafExpired           │ Load a new CAF; not auto-recoverable             │
//! │ SigningFailure       │ Inspect the CAF key; the folio was voided        │
//! │ SchemaValidation     │ Bug — the document never left the machine        │
//! │ Transmission         │ Transient; the worker retries with backoff       │
//! │ RejectedByAuthority  │ Issue a corrected document under a NEW folio     │
//! └──────────────────────┴──────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use timbre_core::error::{CoreError, ValidationError};
use timbre_db::DbError;
use timbre_sign::SignError;

/// Errors surfaced by the issuance pipeline.
#[derive(Debug, Error)]
pub enum IssueError {
    /// Sale input failed precondition validation. Raised before folio
    /// allocation, so no folio is ever burned by bad input.
    #[error("Invalid sale input: {0}")]
    Validation(#[from] ValidationError),

    /// No active, non-expired CAF range covers the requested type.
    #[error("Folio pool exhausted for document type {dte_type}; load a new CAF")]
    FolioExhausted { dte_type: u32 },

    /// The only CAF covering the requested type is past its validity date.
    #[error("CAF for document type {dte_type} is expired; load a new CAF")]
    CafExpired { dte_type: u32 },

    /// TED signing failed. The issuance was aborted and the allocated
    /// folio voided — there is no unsigned-document fallback.
    #[error("TED signing failed: {0}")]
    SigningFailure(SignError),

    /// The assembled document failed its structural check. Blocked locally;
    /// nothing was transmitted. The allocated folio was voided.
    #[error("Document failed structural validation: {0}")]
    SchemaValidation(String),

    /// The authority endpoint could not be reached. The document stays
    /// `pending` and the worker retries with backoff.
    #[error("Transmission failed: {0}")]
    Transmission(String),

    /// The authority rejected the document. Terminal for that folio.
    #[error("Document {id} rejected by authority: {reason}")]
    RejectedByAuthority { id: String, reason: String },

    /// Storage-layer failure not covered by a more specific variant.
    #[error("Storage error: {0}")]
    Db(DbError),

    /// Internal invariant violation.
    #[error("Internal issuance error: {0}")]
    Internal(String),
}

/// Result type for issuance operations.
pub type IssueResult<T> = Result<T, IssueError>;

/// Folio-pool conditions get their own variants; everything else stays a
/// storage error.
impl From<DbError> for IssueError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::FolioExhausted { dte_type } => IssueError::FolioExhausted { dte_type },
            DbError::CafExpired { dte_type } => IssueError::CafExpired { dte_type },
            other => IssueError::Db(other),
        }
    }
}

impl From<SignError> for IssueError {
    fn from(err: SignError) -> Self {
        IssueError::SigningFailure(err)
    }
}

impl From<CoreError> for IssueError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => IssueError::Validation(v),
            CoreError::MissingElement { .. } | CoreError::MalformedXml(_) => {
                IssueError::SchemaValidation(err.to_string())
            }
            other => IssueError::Internal(other.to_string()),
        }
    }
}
