//! # timbre-sign: CAF Parsing and TED Signing
//!
//! Everything cryptographic lives here: parsing the authority-issued CAF
//! (folio range + embedded RSA key material), building and signing the TED
//! descriptor, and encoding the barcode payload for the printing
//! collaborator.
//!
//! ## Signing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         TED Signing Flow                                │
//! │                                                                         │
//! │  CAF XML (authority-issued)                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Caf::parse() ── extracts RNG, RSAPK, RSASK, raw <CAF> block           │
//! │       │           (key extraction failure = abort, fail-closed)        │
//! │       ▼                                                                 │
//! │  TedDescriptor::new(sale, folio) ── assembles the DD field set         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  canonical_dd() ── single-line DD bytes, the exact signed content      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  sign() ── SHA1withRSA (PKCS#1 v1.5) over the canonical bytes          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  <TED version="1.0"><DD>…</DD><FRMT algoritmo="SHA1withRSA">b64</FRMT> │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`caf`] - the authority-issued certificate and its key material
//! - [`ted`] - TED descriptor construction, canonicalization, signing
//! - [`crypto`] - SHA1withRSA primitives over PEM key material
//! - [`barcode`] - printer barcode payload encoding
//! - [`error`] - signing error types

pub mod barcode;
pub mod caf;
pub mod crypto;
pub mod error;
pub mod ted;

#[cfg(test)]
pub(crate) mod testutil;

pub use caf::Caf;
pub use error::{SignError, SignResult};
pub use ted::TedDescriptor;
