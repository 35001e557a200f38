//! # Domain Types
//!
//! Core domain types for DTE issuance.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   DteDocument   │   │     DteItem     │   │    Issuer       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (derived)   │   │  line_number    │   │  rut            │       │
//! │  │  dte_type       │   │  name           │   │  razon_social   │       │
//! │  │  folio          │   │  quantity       │   │  giro           │       │
//! │  │  breakdown      │   │  unit_price     │   │  address        │       │
//! │  │  ted_xml        │   │  line_total     │   └─────────────────┘       │
//! │  │  status         │   └─────────────────┘                              │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    DteType      │   │   DteStatus     │   │ PaymentMethod   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Boleta (39)    │   │  Pending        │   │  Cash           │       │
//! │  │  Factura (33)   │   │  Sent           │   │  Transfer       │       │
//! │  │  NotaCredito(61)│   │  Accepted       │   │  ExternalCard   │       │
//! │  │  NotaDebito(56) │   │  Rejected       │   └─────────────────┘       │
//! │  └─────────────────┘   │  Voided         │                              │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every issued document has:
//! - `id`: derived deterministically from `(type, issuer RUT, folio)` —
//!   traceable storage and lookup without coordination
//! - `sale_id`: the originating sale's identifier — the idempotency key

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tax::TaxBreakdown;

// =============================================================================
// Document Type
// =============================================================================

/// The DTE document kind, by SII numeric code.
///
/// Each kind carries its own schema variant: the Factura family requires a
/// receiver, the Boleta family forbids waiting on one, and the Notas must
/// reference the original document they correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DteType {
    /// Factura Electrónica (33).
    Factura,
    /// Factura Exenta (34).
    FacturaExenta,
    /// Boleta Electrónica (39) - the everyday retail receipt.
    Boleta,
    /// Boleta Exenta (41).
    BoletaExenta,
    /// Nota de Débito (56).
    NotaDebito,
    /// Nota de Crédito (61).
    NotaCredito,
}

impl DteType {
    /// The numeric code the authority assigns to this document kind.
    pub const fn code(&self) -> u32 {
        match self {
            DteType::Factura => 33,
            DteType::FacturaExenta => 34,
            DteType::Boleta => 39,
            DteType::BoletaExenta => 41,
            DteType::NotaDebito => 56,
            DteType::NotaCredito => 61,
        }
    }

    /// Looks a kind up by its numeric code.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            33 => Some(DteType::Factura),
            34 => Some(DteType::FacturaExenta),
            39 => Some(DteType::Boleta),
            41 => Some(DteType::BoletaExenta),
            56 => Some(DteType::NotaDebito),
            61 => Some(DteType::NotaCredito),
            _ => None,
        }
    }

    /// Whether the schema variant requires a receiver block.
    /// Facturas identify the buyer; boletas are anonymous retail documents.
    pub const fn requires_receiver(&self) -> bool {
        matches!(
            self,
            DteType::Factura | DteType::FacturaExenta | DteType::NotaDebito | DteType::NotaCredito
        )
    }

    /// Whether the document must reference an original document's folio
    /// (Notas de Crédito/Débito correct a previously issued document).
    pub const fn requires_reference(&self) -> bool {
        matches!(self, DteType::NotaCredito | DteType::NotaDebito)
    }

    /// Whether line items on this kind are tax-exempt by definition.
    pub const fn is_exempt(&self) -> bool {
        matches!(self, DteType::FacturaExenta | DteType::BoletaExenta)
    }
}

// =============================================================================
// Document Status
// =============================================================================

/// Lifecycle status of an issued document.
///
/// ## Legal Transitions
/// ```text
/// Pending ──► Sent ──► Accepted
///    │          └────► Rejected
///    └──► Voided   (assembly failed after the folio was already consumed;
///                   the folio is burned, never returned to the pool)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum DteStatus {
    /// Locally signed and stored; awaiting submission.
    Pending,
    /// Handed to the authority's endpoint; awaiting verdict.
    Sent,
    /// Authority accepted the document.
    Accepted,
    /// Authority rejected the document. The folio stays consumed; a corrected
    /// document must be issued under a new folio.
    Rejected,
    /// Assembly failed after folio allocation; folio burned.
    Voided,
}

impl Default for DteStatus {
    fn default() -> Self {
        DteStatus::Pending
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How the underlying sale was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Bank transfer.
    Transfer,
    /// Card payment on an external terminal. The card network's voucher is
    /// the fiscal record; no DTE is issued.
    ExternalCard,
}

impl PaymentMethod {
    /// Whether a sale paid this way needs a tax document at all.
    pub const fn requires_fiscal_document(&self) -> bool {
        !matches!(self, PaymentMethod::ExternalCard)
    }
}

// =============================================================================
// Parties
// =============================================================================

/// The emitting taxpayer (the pharmacy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    /// RUT in `NNNNNNNN-K` form.
    pub rut: String,
    /// Legal company name.
    pub razon_social: String,
    /// Line of business declared to the authority.
    pub giro: String,
    /// Street address of the issuing branch.
    pub address: String,
    /// Comuna of the issuing branch.
    pub comuna: String,
}

/// The receiving taxpayer. Required for Facturas and Notas; absent on Boletas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receiver {
    /// RUT in `NNNNNNNN-K` form.
    pub rut: String,
    /// Legal name.
    pub razon_social: String,
    /// Line of business, when known.
    pub giro: Option<String>,
    /// Address, when known.
    pub address: Option<String>,
}

// =============================================================================
// Line Items & References
// =============================================================================

/// A line item on the document.
/// Snapshot pattern: product data is frozen at issuance time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DteItem {
    /// 1-based line number.
    pub line_number: u32,
    /// Item description as it appears on the document.
    pub name: String,
    /// Units sold.
    pub quantity: i64,
    /// Unit price in pesos at issuance time.
    pub unit_price: i64,
    /// Line total in pesos (`unit_price × quantity`).
    pub line_total: i64,
    /// Whether this line is tax-exempt.
    pub exempt: bool,
}

impl DteItem {
    /// Builds a line with the total derived from price × quantity.
    pub fn new(line_number: u32, name: impl Into<String>, quantity: i64, unit_price: i64) -> Self {
        DteItem {
            line_number,
            name: name.into(),
            quantity,
            unit_price,
            line_total: unit_price * quantity,
            exempt: false,
        }
    }
}

/// Reference to an original document, required on Notas de Crédito/Débito.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DteReference {
    /// Kind of the referenced document.
    pub doc_type: DteType,
    /// Folio of the referenced document.
    pub folio: i64,
    /// Reason for the correction (free text, shown to the authority).
    pub reason: String,
}

// =============================================================================
// Document
// =============================================================================

/// A fully assembled electronic tax document.
///
/// Created atomically with its folio; the serialized form (`xml`) and the
/// signed descriptor (`ted_xml`) are immutable once built — any change
/// invalidates the TED signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DteDocument {
    /// Deterministic identifier: `DTE-{code}-{issuer_rut}-{folio}`.
    pub id: String,
    /// Originating sale identifier (the idempotency key).
    pub sale_id: String,
    /// Document kind.
    pub dte_type: DteType,
    /// Folio drawn from the CAF range.
    pub folio: i64,
    /// Emitting taxpayer.
    pub issuer: Issuer,
    /// Receiving taxpayer, when the kind requires one.
    pub receiver: Option<Receiver>,
    /// Line items.
    pub items: Vec<DteItem>,
    /// Referenced original document (Notas only).
    pub reference: Option<DteReference>,
    /// Net / IVA / exempt / total split.
    pub breakdown: TaxBreakdown,
    /// The signed TED descriptor XML, embedded verbatim in `xml`.
    pub ted_xml: String,
    /// The complete serialized document.
    pub xml: String,
    /// Lifecycle status.
    pub status: DteStatus,
    /// Tracking id returned by the authority's endpoint once submitted.
    pub track_id: Option<String>,
    /// Issue timestamp.
    pub issued_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

impl DteDocument {
    /// Derives the deterministic document identifier from
    /// `(type, issuer RUT, folio)`.
    pub fn derive_id(dte_type: DteType, issuer_rut: &str, folio: i64) -> String {
        format!("DTE-{}-{}-{}", dte_type.code(), issuer_rut, folio)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes_round_trip() {
        for t in [
            DteType::Factura,
            DteType::FacturaExenta,
            DteType::Boleta,
            DteType::BoletaExenta,
            DteType::NotaDebito,
            DteType::NotaCredito,
        ] {
            assert_eq!(DteType::from_code(t.code()), Some(t));
        }
        assert_eq!(DteType::from_code(99), None);
    }

    #[test]
    fn test_receiver_requirements() {
        assert!(DteType::Factura.requires_receiver());
        assert!(!DteType::Boleta.requires_receiver());
        assert!(DteType::NotaCredito.requires_receiver());
    }

    #[test]
    fn test_reference_requirements() {
        assert!(DteType::NotaCredito.requires_reference());
        assert!(DteType::NotaDebito.requires_reference());
        assert!(!DteType::Boleta.requires_reference());
        assert!(!DteType::Factura.requires_reference());
    }

    #[test]
    fn test_fiscalization_gate() {
        assert!(PaymentMethod::Cash.requires_fiscal_document());
        assert!(PaymentMethod::Transfer.requires_fiscal_document());
        assert!(!PaymentMethod::ExternalCard.requires_fiscal_document());
    }

    #[test]
    fn test_derived_id_is_deterministic() {
        let a = DteDocument::derive_id(DteType::Boleta, "76543210-5", 1042);
        let b = DteDocument::derive_id(DteType::Boleta, "76543210-5", 1042);
        assert_eq!(a, b);
        assert_eq!(a, "DTE-39-76543210-5-1042");
    }

    #[test]
    fn test_item_line_total() {
        let item = DteItem::new(1, "Paracetamol 500mg", 3, 1990);
        assert_eq!(item.line_total, 5970);
    }
}
