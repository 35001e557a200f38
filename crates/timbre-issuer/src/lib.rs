//! # timbre-issuer: Document Assembly and Submission
//!
//! The orchestration crate of the workspace: it ties the pure logic
//! (timbre-core), the crypto (timbre-sign) and the durable store
//! (timbre-db) into the end-to-end issuance pipeline.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Timbre Issuance Flow                              │
//! │                                                                         │
//! │  POS sale finalization                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   timbre-issuer (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐              ┌───────────────────────────┐ │   │
//! │  │   │  DteBuilder   │              │    SubmissionWorker       │ │   │
//! │  │   │ (builder.rs)  │              │    (submitter.rs)         │ │   │
//! │  │   │               │   'pending'  │                           │ │   │
//! │  │   │ gate→validate │─────────────►│ poll → submit → verdict   │ │   │
//! │  │   │ →folio→sign   │              │ backoff on failure        │ │   │
//! │  │   │ →check→store  │              │                           │ │   │
//! │  │   └───────────────┘              └───────────────────────────┘ │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                      │                          │
//! │       ▼                                      ▼                          │
//! │  timbre-db (folio counter, documents)   SubmissionEndpoint (SII)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`builder`] - The issuance pipeline (gate, validate, allocate, sign, store)
//! - [`submitter`] - Background submission worker and the endpoint boundary
//! - [`config`] - Issuer identity and worker pacing
//! - [`error`] - The operator-facing error taxonomy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use timbre_issuer::{DteBuilder, IssuerConfig, SaleRequest};
//!
//! let builder = DteBuilder::new(db.clone(), &config)?;
//! match builder.issue(request).await? {
//!     IssueOutcome::Issued(doc) => print_receipt(&doc),
//!     IssueOutcome::AlreadyIssued(doc) => print_receipt(&doc),
//!     IssueOutcome::NotRequired => {} // card voucher is the fiscal record
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod builder;
pub mod config;
pub mod error;
pub mod submitter;

// =============================================================================
// Re-exports
// =============================================================================

pub use builder::{DteBuilder, IssueOutcome, SaleRequest};
pub use config::{IssuerConfig, SubmissionConfig};
pub use error::{IssueError, IssueResult};
pub use submitter::{
    SubmissionEndpoint, SubmissionVerdict, SubmissionWorker, SubmissionWorkerHandle,
};
