//! # timbre-core: Pure Business Logic for DTE Issuance
//!
//! This crate is the **heart** of Timbre. It contains the business rules for
//! electronic tax document (DTE) issuance as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Timbre Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    POS sale-finalization flow                   │   │
//! │  │        (external collaborator: amounts, items, payment)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    timbre-issuer (builder)                      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ timbre-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │    tax    │  │    xml    │  │ validation│  │   │
//! │  │   │ DteType   │  │ Breakdown │  │ serialize │  │  RUT +    │  │   │
//! │  │   │ Document  │  │ rounding  │  │ escaping  │  │  items    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (DteType, DteDocument, Issuer, items, statuses)
//! - [`tax`] - IVA splits and price rounding (integer pesos, no floats!)
//! - [`xml`] - Schema-variant document serialization and escaping
//! - [`validation`] - RUT check digits and document preconditions
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//! 1. All monetary values are `i64` whole pesos (CLP has no subunit)
//! 2. Rounding happens exactly once per computed field, never twice
//! 3. Errors are typed enum variants, never strings

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod tax;
pub mod types;
pub mod validation;
pub mod xml;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use tax::{TaxBreakdown, IVA_RATE_BPS};
pub use types::{
    DteDocument, DteItem, DteReference, DteStatus, DteType, Issuer, PaymentMethod, Receiver,
};
