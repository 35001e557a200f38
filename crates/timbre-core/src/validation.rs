//! # Validation Module
//!
//! Input validation for DTE issuance.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: POS sale-finalization flow (external collaborator)           │
//! │  └── Cart-level checks, payment method selection                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - document preconditions                          │
//! │  ├── RUT check digits, receiver/reference requirements                 │
//! │  └── Runs BEFORE a folio is allocated: a validation failure must       │
//! │      never burn a folio                                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE (dte_type, folio) and UNIQUE sale_id constraints           │
//! │  └── Foreign key constraints                                           │
//! │                                                                         │
//! │  Defense in depth: Multiple layers catch different errors              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{DteItem, DteReference, DteType, Receiver};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length for free-text item descriptions on the document.
pub const MAX_ITEM_NAME_LEN: usize = 80;

/// Maximum length for party names (razón social).
pub const MAX_PARTY_NAME_LEN: usize = 100;

// =============================================================================
// RUT Validation
// =============================================================================

/// Validates a RUT (`NNNNNNNN-K` form) including its mod-11 check digit.
///
/// ## Example
/// ```rust
/// use timbre_core::validation::validate_rut;
///
/// assert!(validate_rut("76086428-5").is_ok());
/// assert!(validate_rut("76086428-0").is_err()); // wrong check digit
/// assert!(validate_rut("not-a-rut").is_err());
/// ```
pub fn validate_rut(rut: &str) -> ValidationResult<()> {
    let rut = rut.trim();

    if rut.is_empty() {
        return Err(ValidationError::Required {
            field: "rut".to_string(),
        });
    }

    let (body, dv) = rut.split_once('-').ok_or_else(|| ValidationError::InvalidFormat {
        field: "rut".to_string(),
        reason: "expected NNNNNNNN-K form".to_string(),
    })?;

    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "rut".to_string(),
            reason: "body must be numeric".to_string(),
        });
    }

    let expected = compute_check_digit(body);
    let given = dv.to_ascii_uppercase();
    if given != expected {
        return Err(ValidationError::InvalidRut {
            rut: rut.to_string(),
        });
    }

    Ok(())
}

/// Computes the mod-11 check digit for a RUT body.
///
/// Digits are weighted 2,3,4,5,6,7 right-to-left, cycling; the check digit
/// is `11 - (sum mod 11)`, with 11 → "0" and 10 → "K".
fn compute_check_digit(body: &str) -> String {
    let mut sum: u32 = 0;
    let mut weight = 2;
    for c in body.chars().rev() {
        sum += c.to_digit(10).unwrap_or(0) * weight;
        weight = if weight == 7 { 2 } else { weight + 1 };
    }
    match 11 - (sum % 11) {
        11 => "0".to_string(),
        10 => "K".to_string(),
        d => d.to_string(),
    }
}

// =============================================================================
// Document Preconditions
// =============================================================================

/// Validates the full precondition set for a build request.
///
/// ## Rules
/// - At least one item, each with positive quantity and non-negative price
/// - Item line totals sum to the declared total
/// - Receiver present (and valid) when the document type requires one
/// - Reference present when the type is a Nota de Crédito/Débito
pub fn validate_build_preconditions(
    dte_type: DteType,
    items: &[DteItem],
    declared_total: i64,
    receiver: Option<&Receiver>,
    reference: Option<&DteReference>,
) -> ValidationResult<()> {
    validate_items(items)?;

    let items_total: i64 = items.iter().map(|i| i.line_total).sum();
    if items_total != declared_total {
        // Surfaced by the caller as CoreError::TotalMismatch; here we only
        // guard the field-level shape
        return Err(ValidationError::InvalidFormat {
            field: "total".to_string(),
            reason: format!("items sum to {items_total}, declared {declared_total}"),
        });
    }

    match (dte_type.requires_receiver(), receiver) {
        (true, None) => {
            return Err(ValidationError::ReceiverRequired {
                dte_type: dte_type.code(),
            })
        }
        (_, Some(r)) => validate_receiver(r)?,
        (false, None) => {}
    }

    if dte_type.requires_reference() && reference.is_none() {
        return Err(ValidationError::ReferenceRequired {
            dte_type: dte_type.code(),
        });
    }

    Ok(())
}

/// Validates the line item set.
pub fn validate_items(items: &[DteItem]) -> ValidationResult<()> {
    if items.is_empty() {
        return Err(ValidationError::NoItems);
    }

    for item in items {
        let name = item.name.trim();
        if name.is_empty() {
            return Err(ValidationError::Required {
                field: "item.name".to_string(),
            });
        }
        // Caps are in characters; accented names must not be penalized
        // for their UTF-8 byte width
        if name.chars().count() > MAX_ITEM_NAME_LEN {
            return Err(ValidationError::TooLong {
                field: "item.name".to_string(),
                max: MAX_ITEM_NAME_LEN,
            });
        }
        if item.quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "item.quantity".to_string(),
            });
        }
        if item.unit_price < 0 {
            return Err(ValidationError::MustBePositive {
                field: "item.unit_price".to_string(),
            });
        }
        if item.line_total != item.unit_price * item.quantity {
            return Err(ValidationError::InvalidFormat {
                field: "item.line_total".to_string(),
                reason: "line_total must equal unit_price × quantity".to_string(),
            });
        }
    }

    Ok(())
}

/// Validates a receiver block.
pub fn validate_receiver(receiver: &Receiver) -> ValidationResult<()> {
    validate_rut(&receiver.rut)?;

    let name = receiver.razon_social.trim();
    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "receiver.razon_social".to_string(),
        });
    }
    if name.chars().count() > MAX_PARTY_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "receiver.razon_social".to_string(),
            max: MAX_PARTY_NAME_LEN,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
