//! # Document Repository
//!
//! Persistence and status tracking for issued documents.
//!
//! ## Status Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   pending ──mark_sent──► sent ──record_accepted──► accepted            │
//! │      │                    │                                             │
//! │      │                    └────record_rejected───► rejected            │
//! │      └──mark_voided──► voided                                           │
//! │                                                                         │
//! │   Every transition is a guarded UPDATE (WHERE status = <required>):    │
//! │   a stale caller gets InvalidTransition, never a silent overwrite.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A rejected document keeps its folio; corrections are issued under a new
//! folio. `UNIQUE(sale_id)` in the schema backs the idempotency contract
//! even if two builds race past the lookup.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use timbre_core::{
    DteDocument, DteItem, DteReference, DteStatus, DteType, Issuer, Receiver, TaxBreakdown,
};

use crate::error::{DbError, DbResult};

// =============================================================================
// Rows
// =============================================================================

/// A dte_documents row. Party and item payloads are stored as JSON columns;
/// the money split is flattened for the schema-level sum CHECK.
#[derive(Debug, Clone, sqlx::FromRow)]
struct DteDocumentRow {
    id: String,
    sale_id: String,
    dte_type: DteType,
    folio: i64,
    issuer_json: String,
    receiver_json: Option<String>,
    items_json: String,
    reference_json: Option<String>,
    net: i64,
    iva: i64,
    exempt: i64,
    total: i64,
    ted_xml: String,
    xml: String,
    status: DteStatus,
    track_id: Option<String>,
    #[allow(dead_code)]
    attempts: i64,
    #[allow(dead_code)]
    last_error: Option<String>,
    issued_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DteDocumentRow {
    fn into_document(self) -> DbResult<DteDocument> {
        let issuer: Issuer = serde_json::from_str(&self.issuer_json)?;
        let receiver: Option<Receiver> = self
            .receiver_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let items: Vec<DteItem> = serde_json::from_str(&self.items_json)?;
        let reference: Option<DteReference> = self
            .reference_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(DteDocument {
            id: self.id,
            sale_id: self.sale_id,
            dte_type: self.dte_type,
            folio: self.folio,
            issuer,
            receiver,
            items,
            reference,
            breakdown: TaxBreakdown {
                net: self.net,
                iva: self.iva,
                exempt: self.exempt,
                total: self.total,
            },
            ted_xml: self.ted_xml,
            xml: self.xml,
            status: self.status,
            track_id: self.track_id,
            issued_at: self.issued_at,
            updated_at: self.updated_at,
        })
    }
}

/// A document queued for submission: just what the worker needs.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingDocument {
    pub id: String,
    pub dte_type: DteType,
    pub folio: i64,
    pub xml: String,
    pub attempts: i64,
    pub issued_at: DateTime<Utc>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for issued-document operations.
#[derive(Debug, Clone)]
pub struct DocumentRepository {
    pool: SqlitePool,
}

impl DocumentRepository {
    /// Creates a new DocumentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DocumentRepository { pool }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Persists a freshly built document.
    ///
    /// The schema enforces the two identity invariants on insert:
    /// - `UNIQUE(sale_id)`: a racing duplicate build surfaces as
    ///   UniqueViolation and the caller falls back to the stored document
    /// - `UNIQUE(dte_type, folio)`: folio reuse is rejected outright
    pub async fn insert(&self, doc: &DteDocument) -> DbResult<()> {
        let issuer_json = serde_json::to_string(&doc.issuer)?;
        let receiver_json = doc
            .receiver
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let items_json = serde_json::to_string(&doc.items)?;
        let reference_json = doc
            .reference
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO dte_documents (
                id, sale_id, dte_type, folio,
                issuer_json, receiver_json, items_json, reference_json,
                net, iva, exempt, total,
                ted_xml, xml, status, track_id, attempts, last_error,
                issued_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15, NULL, 0, NULL, ?16, ?17
            )
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.sale_id)
        .bind(doc.dte_type)
        .bind(doc.folio)
        .bind(&issuer_json)
        .bind(&receiver_json)
        .bind(&items_json)
        .bind(&reference_json)
        .bind(doc.breakdown.net)
        .bind(doc.breakdown.iva)
        .bind(doc.breakdown.exempt)
        .bind(doc.breakdown.total)
        .bind(&doc.ted_xml)
        .bind(&doc.xml)
        .bind(doc.status)
        .bind(doc.issued_at)
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await?;

        info!(
            id = %doc.id,
            sale_id = %doc.sale_id,
            folio = doc.folio,
            total = doc.breakdown.total,
            "Document stored"
        );

        Ok(())
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// pending → sent, recording the authority's tracking id.
    pub async fn mark_sent(&self, id: &str, track_id: &str) -> DbResult<()> {
        self.transition(
            id,
            "UPDATE dte_documents
             SET status = 'sent', track_id = ?2, updated_at = ?3
             WHERE id = ?1 AND status = 'pending'",
            Some(track_id),
            "sent",
        )
        .await?;

        debug!(id = %id, track_id, "Document sent");
        Ok(())
    }

    /// sent → accepted. Terminal.
    pub async fn record_accepted(&self, id: &str) -> DbResult<()> {
        self.transition(
            id,
            "UPDATE dte_documents
             SET status = 'accepted', last_error = NULL, updated_at = ?3
             WHERE id = ?1 AND status = 'sent'",
            None,
            "accepted",
        )
        .await?;

        info!(id = %id, "Document accepted by authority");
        Ok(())
    }

    /// sent → rejected. Terminal for this folio: a corrected document must
    /// be issued under a new one.
    pub async fn record_rejected(&self, id: &str, reason: &str) -> DbResult<()> {
        self.transition(
            id,
            "UPDATE dte_documents
             SET status = 'rejected', last_error = ?2, updated_at = ?3
             WHERE id = ?1 AND status = 'sent'",
            Some(reason),
            "rejected",
        )
        .await?;

        warn!(id = %id, reason, "Document rejected by authority");
        Ok(())
    }

    /// pending → voided (operator action before submission).
    pub async fn mark_voided(&self, id: &str, reason: &str) -> DbResult<()> {
        self.transition(
            id,
            "UPDATE dte_documents
             SET status = 'voided', last_error = ?2, updated_at = ?3
             WHERE id = ?1 AND status = 'pending'",
            Some(reason),
            "voided",
        )
        .await?;

        warn!(id = %id, reason, "Document voided");
        Ok(())
    }

    /// Records a failed submission attempt without leaving `pending`;
    /// the worker retries with backoff.
    pub async fn record_attempt(&self, id: &str, error: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE dte_documents
             SET attempts = attempts + 1, last_error = ?2, updated_at = ?3
             WHERE id = ?1",
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Document", id));
        }

        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Looks a document up by its derived id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<DteDocument>> {
        let row = sqlx::query_as::<_, DteDocumentRow>("SELECT * FROM dte_documents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(DteDocumentRow::into_document).transpose()
    }

    /// Idempotency lookup: the document already issued for a sale, if any.
    pub async fn find_by_sale_id(&self, sale_id: &str) -> DbResult<Option<DteDocument>> {
        let row =
            sqlx::query_as::<_, DteDocumentRow>("SELECT * FROM dte_documents WHERE sale_id = ?1")
                .bind(sale_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(DteDocumentRow::into_document).transpose()
    }

    /// Documents awaiting submission, oldest first.
    pub async fn pending_for_submission(&self, limit: i64) -> DbResult<Vec<PendingDocument>> {
        let rows = sqlx::query_as::<_, PendingDocument>(
            r#"
            SELECT id, dte_type, folio, xml, attempts, issued_at
            FROM dte_documents
            WHERE status = 'pending'
            ORDER BY issued_at ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Documents currently in a status (operator dashboards, tests).
    pub async fn list_by_status(&self, status: DteStatus) -> DbResult<Vec<DteDocument>> {
        let rows = sqlx::query_as::<_, DteDocumentRow>(
            "SELECT * FROM dte_documents WHERE status = ?1 ORDER BY issued_at ASC",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DteDocumentRow::into_document).collect()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Runs a guarded transition UPDATE. Zero rows affected means either the
    /// document is missing or it sits in a state the transition forbids.
    async fn transition(
        &self,
        id: &str,
        sql: &str,
        arg: Option<&str>,
        target: &str,
    ) -> DbResult<()> {
        let result = sqlx::query(sql)
            .bind(id)
            .bind(arg)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            let exists: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM dte_documents WHERE id = ?1")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await?;

            return if exists == 0 {
                Err(DbError::not_found("Document", id))
            } else {
                Err(DbError::InvalidTransition {
                    id: id.to_string(),
                    target: target.to_string(),
                })
            };
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn sample_document(sale_id: &str, folio: i64) -> DteDocument {
        let issuer = Issuer {
            rut: "76086428-5".to_string(),
            razon_social: "Farmacia Austral SpA".to_string(),
            giro: "Venta de productos farmacéuticos".to_string(),
            address: "Av. Libertador 1234".to_string(),
            comuna: "Santiago".to_string(),
        };
        let items = vec![DteItem::new(1, "Ibuprofeno 400mg", 1, 15990)];
        let breakdown = TaxBreakdown::from_gross(15990).unwrap();
        let now = Utc::now();

        DteDocument {
            id: DteDocument::derive_id(DteType::Boleta, &issuer.rut, folio),
            sale_id: sale_id.to_string(),
            dte_type: DteType::Boleta,
            folio,
            issuer,
            receiver: None,
            items,
            reference: None,
            breakdown,
            ted_xml: "<TED version=\"1.0\"><DD/><FRMT algoritmo=\"SHA1withRSA\">sig</FRMT></TED>"
                .to_string(),
            xml: "<DTE version=\"1.0\"><Documento/></DTE>".to_string(),
            status: DteStatus::Pending,
            track_id: None,
            issued_at: now,
            updated_at: now,
        }
    }

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_round_trip() {
        let db = test_db().await;
        let repo = db.documents();
        let doc = sample_document("sale-001", 42);
        repo.insert(&doc).await.unwrap();

        let stored = repo.get_by_id(&doc.id).await.unwrap().unwrap();
        assert_eq!(stored.sale_id, "sale-001");
        assert_eq!(stored.folio, 42);
        assert_eq!(stored.breakdown.total, 15990);
        assert_eq!(stored.breakdown.net + stored.breakdown.iva, 15990);
        assert_eq!(stored.items.len(), 1);
        assert_eq!(stored.status, DteStatus::Pending);
        assert!(stored.receiver.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_sale_id_rejected() {
        let db = test_db().await;
        let repo = db.documents();
        repo.insert(&sample_document("sale-dup", 1)).await.unwrap();

        let err = repo.insert(&sample_document("sale-dup", 2)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        // The idempotency lookup still finds the original
        let found = repo.find_by_sale_id("sale-dup").await.unwrap().unwrap();
        assert_eq!(found.folio, 1);
    }

    #[tokio::test]
    async fn test_duplicate_folio_rejected() {
        let db = test_db().await;
        let repo = db.documents();
        repo.insert(&sample_document("sale-a", 7)).await.unwrap();

        let err = repo.insert(&sample_document("sale-b", 7)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_lifecycle_happy_path() {
        let db = test_db().await;
        let repo = db.documents();
        let doc = sample_document("sale-life", 10);
        repo.insert(&doc).await.unwrap();

        repo.mark_sent(&doc.id, "TRK-12345").await.unwrap();
        let sent = repo.get_by_id(&doc.id).await.unwrap().unwrap();
        assert_eq!(sent.status, DteStatus::Sent);
        assert_eq!(sent.track_id.as_deref(), Some("TRK-12345"));

        repo.record_accepted(&doc.id).await.unwrap();
        let accepted = repo.get_by_id(&doc.id).await.unwrap().unwrap();
        assert_eq!(accepted.status, DteStatus::Accepted);
    }

    #[tokio::test]
    async fn test_rejection_keeps_folio_and_reason() {
        let db = test_db().await;
        let repo = db.documents();
        let doc = sample_document("sale-rej", 11);
        repo.insert(&doc).await.unwrap();
        repo.mark_sent(&doc.id, "TRK-1").await.unwrap();
        repo.record_rejected(&doc.id, "RUT emisor no autorizado").await.unwrap();

        let rejected = repo.get_by_id(&doc.id).await.unwrap().unwrap();
        assert_eq!(rejected.status, DteStatus::Rejected);
        // Folio stays consumed on the rejected row
        assert_eq!(rejected.folio, 11);
    }

    #[tokio::test]
    async fn test_illegal_transitions_refused() {
        let db = test_db().await;
        let repo = db.documents();
        let doc = sample_document("sale-guard", 12);
        repo.insert(&doc).await.unwrap();

        // Verdicts require 'sent'
        let err = repo.record_accepted(&doc.id).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidTransition { .. }));

        repo.mark_sent(&doc.id, "TRK-2").await.unwrap();

        // Double-send refused
        let err = repo.mark_sent(&doc.id, "TRK-3").await.unwrap_err();
        assert!(matches!(err, DbError::InvalidTransition { .. }));

        // Accepted is terminal
        repo.record_accepted(&doc.id).await.unwrap();
        let err = repo.record_rejected(&doc.id, "late").await.unwrap_err();
        assert!(matches!(err, DbError::InvalidTransition { .. }));

        // Unknown id is NotFound, not a transition error
        let err = repo.mark_sent("DTE-39-0-0", "TRK-4").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_pending_feed_is_oldest_first() {
        let db = test_db().await;
        let repo = db.documents();

        let mut older = sample_document("sale-old", 20);
        older.issued_at = Utc::now() - chrono::Duration::minutes(10);
        repo.insert(&older).await.unwrap();
        repo.insert(&sample_document("sale-new", 21)).await.unwrap();

        let pending = repo.pending_for_submission(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].folio, 20);
        assert_eq!(pending[1].folio, 21);

        // Sent documents drop out of the feed
        repo.mark_sent(&older.id, "TRK-5").await.unwrap();
        let pending = repo.pending_for_submission(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].folio, 21);
    }

    #[tokio::test]
    async fn test_attempts_accumulate() {
        let db = test_db().await;
        let repo = db.documents();
        let doc = sample_document("sale-retry", 30);
        repo.insert(&doc).await.unwrap();

        repo.record_attempt(&doc.id, "connection refused").await.unwrap();
        repo.record_attempt(&doc.id, "timeout").await.unwrap();

        let pending = repo.pending_for_submission(10).await.unwrap();
        assert_eq!(pending[0].attempts, 2);
    }
}
