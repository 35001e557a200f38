//! # Error Types
//!
//! Domain-specific error types for timbre-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  timbre-core errors (this file)                                        │
//! │  ├── CoreError        - Tax math and domain rule failures              │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  timbre-sign errors (separate crate)                                   │
//! │  └── SignError        - CAF parsing and signing failures               │
//! │                                                                         │
//! │  timbre-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  timbre-issuer errors (separate crate)                                 │
//! │  └── IssueError       - The full issuance taxonomy operators see       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → IssueError → operator             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (RUT, folio, amounts)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to a user-facing message

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations in the pure layer.
/// They should be caught and translated to user-friendly messages.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A monetary amount was negative where only non-negative values make
    /// sense (totals, costs, exempt sums).
    #[error("Amount must not be negative: {amount}")]
    NegativeAmount { amount: i64 },

    /// Margin percentage out of range.
    #[error("Invalid margin percentage: {margin}")]
    InvalidMargin { margin: i64 },

    /// Item line totals do not add up to the declared document total.
    ///
    /// ## When This Occurs
    /// - The POS sent a total that disagrees with its own line items
    /// - An item's line_total was not price × quantity
    #[error("Line items sum to {items_total} but document total is {declared_total}")]
    TotalMismatch {
        items_total: i64,
        declared_total: i64,
    },

    /// The serialized document is missing an element its schema variant
    /// requires. Blocks the document locally, before transmission.
    #[error("Document failed structural check: missing element <{element}>")]
    MissingElement { element: String },

    /// The serialized document could not be re-parsed.
    #[error("Malformed document XML: {0}")]
    MalformedXml(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when issuance input doesn't meet requirements.
/// Used for early validation before a folio is ever allocated.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., malformed RUT).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// RUT check digit does not verify.
    #[error("RUT '{rut}' has an invalid check digit")]
    InvalidRut { rut: String },

    /// The document kind requires a receiver but none was supplied.
    #[error("Document type {dte_type} requires a receiver")]
    ReceiverRequired { dte_type: u32 },

    /// Notas must reference the original document they correct.
    #[error("Document type {dte_type} requires a reference to the original document")]
    ReferenceRequired { dte_type: u32 },

    /// The document has no line items.
    #[error("Document must contain at least one item")]
    NoItems,
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
