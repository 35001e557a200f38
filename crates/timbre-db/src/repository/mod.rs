//! # Repository Layer
//!
//! One repository per aggregate:
//! - [`caf::CafRepository`] — CAF ranges and folio assignment
//! - [`document::DocumentRepository`] — issued documents and status tracking
//!
//! Repositories own all SQL; nothing above this layer builds queries.

pub mod caf;
pub mod document;

pub use caf::{CafRangeRow, CafRepository, FolioAssignment, FolioEventRow};
pub use document::{DocumentRepository, PendingDocument};
