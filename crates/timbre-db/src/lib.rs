//! # timbre-db: Database Layer for Timbre
//!
//! This crate provides durable storage for DTE issuance. It uses SQLite for
//! local storage with sqlx for async operations — a pharmacy POS keeps
//! issuing documents with no network, so everything fiscal lives in a local
//! file first.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Timbre Data Flow                                  │
//! │                                                                         │
//! │  DteBuilder (timbre-issuer)                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     timbre-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ CafRepo       │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ DocumentRepo  │    │ 001_init.sql │  │   │
//! │  │   │ WAL mode      │    │               │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file: caf_ranges │ dte_documents │ folio_events               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (caf, document)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use timbre_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/timbre.db")).await?;
//!
//! let caf = timbre_sign::Caf::parse(&caf_xml)?;
//! db.caf_ranges().load_caf(&caf).await?;
//!
//! let assignment = db.caf_ranges().assign_folio(DteType::Boleta).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::caf::{CafRangeRow, CafRepository, FolioAssignment, FolioEventRow};
pub use repository::document::{DocumentRepository, PendingDocument};
