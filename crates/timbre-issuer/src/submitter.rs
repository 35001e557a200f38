//! # Submission Worker
//!
//! Background task that drains pending documents to the authority endpoint
//! and tracks their verdicts.
//!
//! ## Worker Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Submission Worker Flow                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    dte_documents Table                          │   │
//! │  │                                                                 │   │
//! │  │  id          | status   | track_id | attempts                  │   │
//! │  │  ────────────┼──────────┼──────────┼─────────                  │   │
//! │  │  DTE-39-…-1  │ pending  │ NULL     │ 0                         │   │
//! │  │  DTE-39-…-2  │ sent     │ TRK-881  │ 1                         │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  1. Poll: pending documents, oldest first, batch-limited               │
//! │  2. Submit: endpoint.submit(xml) → track_id → status 'sent'            │
//! │     failure → attempts += 1, document STAYS pending, backoff           │
//! │  3. Query: endpoint.query(track_id) for every 'sent' document          │
//! │     accepted → terminal │ rejected → terminal, reason recorded         │
//! │                                                                         │
//! │  A document over max_attempts is skipped and flagged for an operator;  │
//! │  it is never dropped — the local store is the source of truth.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transmission failure is the expected case, not the exception: a pharmacy
//! keeps selling through network outages and the worker catches up later.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use timbre_db::Database;

use crate::config::IssuerConfig;
use crate::error::{IssueError, IssueResult};

// =============================================================================
// Endpoint Boundary
// =============================================================================

/// The authority's answer to a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionVerdict {
    /// Still being processed; ask again later.
    Processing,
    /// Accepted. Terminal.
    Accepted,
    /// Rejected. Terminal for this folio; a corrected document needs a new one.
    Rejected { reason: String },
}

/// The transport boundary to the authority's reception endpoint.
///
/// Production wires this to the SII SOAP service; tests substitute an
/// in-memory double. The worker only sees this trait.
#[async_trait]
pub trait SubmissionEndpoint: Send + Sync {
    /// Submits a serialized document, returning the authority's tracking id.
    async fn submit(&self, document_id: &str, xml: &str) -> IssueResult<String>;

    /// Queries the verdict for a previously submitted document.
    async fn query(&self, track_id: &str) -> IssueResult<SubmissionVerdict>;
}

// =============================================================================
// Worker
// =============================================================================

/// Drains pending documents to the endpoint and records verdicts.
pub struct SubmissionWorker {
    /// Database connection.
    db: Arc<Database>,

    /// Pipeline configuration.
    config: Arc<IssuerConfig>,

    /// Transport to the authority.
    endpoint: Arc<dyn SubmissionEndpoint>,

    /// Backoff state across endpoint failures.
    backoff: ExponentialBackoff,

    /// Shutdown receiver.
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the submission worker.
#[derive(Clone)]
pub struct SubmissionWorkerHandle {
    /// Shutdown sender.
    shutdown_tx: mpsc::Sender<()>,
}

impl SubmissionWorkerHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> IssueResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| IssueError::Internal("shutdown channel closed".to_string()))
    }
}

impl SubmissionWorker {
    /// Creates a new worker and its control handle.
    pub fn new(
        db: Arc<Database>,
        config: Arc<IssuerConfig>,
        endpoint: Arc<dyn SubmissionEndpoint>,
    ) -> (Self, SubmissionWorkerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(config.submission.initial_backoff_ms),
            max_interval: Duration::from_secs(config.submission.max_backoff_secs),
            // Unset, the worker retries for as long as the process runs
            max_elapsed_time: config.submission.max_elapsed_secs.map(Duration::from_secs),
            ..ExponentialBackoff::default()
        };

        let worker = SubmissionWorker {
            db,
            config,
            endpoint,
            backoff,
            shutdown_rx,
        };

        (worker, SubmissionWorkerHandle { shutdown_tx })
    }

    /// Runs the worker loop.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Submission worker starting");

        let poll_interval = Duration::from_secs(self.config.submission.poll_interval_secs);
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.submit_pending().await {
                        error!(?e, "Failed to process pending documents");
                    }
                    if let Err(e) = self.check_verdicts().await {
                        error!(?e, "Failed to query submission verdicts");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Submission worker shutting down");
                    break;
                }
            }
        }

        info!("Submission worker stopped");
    }

    /// Submits one batch of pending documents, oldest first.
    ///
    /// On an endpoint failure the batch is abandoned for this cycle: the
    /// endpoint is down for everyone, and hammering it helps nobody.
    pub async fn submit_pending(&mut self) -> IssueResult<()> {
        let batch = self
            .db
            .documents()
            .pending_for_submission(self.config.submission.batch_size)
            .await?;

        if batch.is_empty() {
            debug!("No pending documents");
            return Ok(());
        }

        debug!(count = batch.len(), "Submitting pending documents");

        let attempt_timeout = self.attempt_timeout();

        for doc in batch {
            if doc.attempts >= self.config.submission.max_attempts {
                warn!(
                    id = %doc.id,
                    attempts = doc.attempts,
                    "Document over the attempt limit; operator intervention required"
                );
                continue;
            }

            // A hung endpoint counts as a failed attempt; the tick loop
            // must stay responsive to shutdown
            let outcome =
                match tokio::time::timeout(attempt_timeout, self.endpoint.submit(&doc.id, &doc.xml))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(IssueError::Transmission(format!(
                        "no response within {}s",
                        attempt_timeout.as_secs()
                    ))),
                };

            match outcome {
                Ok(track_id) => {
                    self.db.documents().mark_sent(&doc.id, &track_id).await?;
                    self.backoff.reset();
                    info!(id = %doc.id, track_id = %track_id, "Document submitted");
                }
                Err(err) => {
                    self.db
                        .documents()
                        .record_attempt(&doc.id, &err.to_string())
                        .await?;
                    warn!(id = %doc.id, %err, "Submission failed; document stays pending");

                    if let Some(pause) = self.backoff.next_backoff() {
                        tokio::time::sleep(pause).await;
                    }
                    break;
                }
            }
        }

        Ok(())
    }

    /// Queries the verdict for every document awaiting one.
    pub async fn check_verdicts(&mut self) -> IssueResult<()> {
        let sent = self
            .db
            .documents()
            .list_by_status(timbre_core::DteStatus::Sent)
            .await?;

        let attempt_timeout = self.attempt_timeout();

        for doc in sent {
            let Some(track_id) = doc.track_id.as_deref() else {
                // Unreachable while mark_sent records the track id
                warn!(id = %doc.id, "Sent document without a track id");
                continue;
            };

            let verdict = match tokio::time::timeout(attempt_timeout, self.endpoint.query(track_id))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(IssueError::Transmission(format!(
                    "no response within {}s",
                    attempt_timeout.as_secs()
                ))),
            };

            match verdict {
                Ok(SubmissionVerdict::Accepted) => {
                    self.db.documents().record_accepted(&doc.id).await?;
                }
                Ok(SubmissionVerdict::Rejected { reason }) => {
                    self.db.documents().record_rejected(&doc.id, &reason).await?;
                }
                Ok(SubmissionVerdict::Processing) => {
                    debug!(id = %doc.id, track_id, "Still processing");
                }
                Err(err) => {
                    warn!(id = %doc.id, %err, "Verdict query failed; will retry");
                    break;
                }
            }
        }

        Ok(())
    }

    fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.config.submission.attempt_timeout_secs)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use timbre_core::{
        DteDocument, DteItem, DteStatus, DteType, Issuer, TaxBreakdown,
    };
    use timbre_db::DbConfig;

    /// In-memory endpoint double. Configurable failure window and scripted
    /// verdicts, keyed by document id.
    #[derive(Default)]
    struct FakeEndpoint {
        fail_submits: Mutex<u32>,
        hang: Mutex<bool>,
        verdicts: Mutex<HashMap<String, SubmissionVerdict>>,
        submitted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SubmissionEndpoint for FakeEndpoint {
        async fn submit(&self, document_id: &str, _xml: &str) -> IssueResult<String> {
            if *self.hang.lock().unwrap() {
                std::future::pending::<()>().await;
            }
            let mut failures = self.fail_submits.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(IssueError::Transmission("connection refused".to_string()));
            }
            self.submitted.lock().unwrap().push(document_id.to_string());
            Ok(format!("TRK-{document_id}"))
        }

        async fn query(&self, track_id: &str) -> IssueResult<SubmissionVerdict> {
            if *self.hang.lock().unwrap() {
                std::future::pending::<()>().await;
            }
            let id = track_id.trim_start_matches("TRK-");
            Ok(self
                .verdicts
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .unwrap_or(SubmissionVerdict::Processing))
        }
    }

    fn pending_document(sale_id: &str, folio: i64) -> DteDocument {
        let issuer = Issuer {
            rut: "76086428-5".to_string(),
            razon_social: "Farmacia Austral SpA".to_string(),
            giro: "Venta de productos farmacéuticos".to_string(),
            address: "Av. Libertador 1234".to_string(),
            comuna: "Santiago".to_string(),
        };
        let now = Utc::now();
        DteDocument {
            id: DteDocument::derive_id(DteType::Boleta, &issuer.rut, folio),
            sale_id: sale_id.to_string(),
            dte_type: DteType::Boleta,
            folio,
            issuer,
            receiver: None,
            items: vec![DteItem::new(1, "Paracetamol 500mg", 1, 2990)],
            reference: None,
            breakdown: TaxBreakdown::from_gross(2990).unwrap(),
            ted_xml: "<TED version=\"1.0\"><DD/><FRMT algoritmo=\"SHA1withRSA\">s</FRMT></TED>"
                .to_string(),
            xml: "<DTE version=\"1.0\"><Documento/></DTE>".to_string(),
            status: DteStatus::Pending,
            track_id: None,
            issued_at: now,
            updated_at: now,
        }
    }

    fn test_config() -> Arc<IssuerConfig> {
        let mut config = IssuerConfig::new(Issuer {
            rut: "76086428-5".to_string(),
            razon_social: "Farmacia Austral SpA".to_string(),
            giro: "Venta de productos farmacéuticos".to_string(),
            address: "Av. Libertador 1234".to_string(),
            comuna: "Santiago".to_string(),
        });
        // Keep failure pauses and timeouts short in tests
        config.submission.initial_backoff_ms = 1;
        config.submission.max_backoff_secs = 1;
        config.submission.attempt_timeout_secs = 1;
        Arc::new(config)
    }

    async fn setup(endpoint: Arc<FakeEndpoint>) -> (Arc<Database>, SubmissionWorker) {
        let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
        let (worker, _handle) = SubmissionWorker::new(Arc::clone(&db), test_config(), endpoint);
        (db, worker)
    }

    #[tokio::test]
    async fn test_pending_documents_get_sent() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let (db, mut worker) = setup(Arc::clone(&endpoint)).await;

        let doc = pending_document("sale-1", 1);
        db.documents().insert(&doc).await.unwrap();

        worker.submit_pending().await.unwrap();

        let stored = db.documents().get_by_id(&doc.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DteStatus::Sent);
        assert_eq!(stored.track_id.as_deref(), Some(format!("TRK-{}", doc.id).as_str()));
        assert_eq!(endpoint.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_submission_stays_pending() {
        let endpoint = Arc::new(FakeEndpoint::default());
        *endpoint.fail_submits.lock().unwrap() = 1;
        let (db, mut worker) = setup(Arc::clone(&endpoint)).await;

        let doc = pending_document("sale-2", 2);
        db.documents().insert(&doc).await.unwrap();

        worker.submit_pending().await.unwrap();
        let pending = db.documents().pending_for_submission(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);

        // Endpoint recovered; the next cycle drains it
        worker.submit_pending().await.unwrap();
        assert!(db.documents().pending_for_submission(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_verdicts_are_recorded() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let (db, mut worker) = setup(Arc::clone(&endpoint)).await;

        let accepted = pending_document("sale-3", 3);
        let rejected = pending_document("sale-4", 4);
        db.documents().insert(&accepted).await.unwrap();
        db.documents().insert(&rejected).await.unwrap();

        endpoint
            .verdicts
            .lock()
            .unwrap()
            .insert(accepted.id.clone(), SubmissionVerdict::Accepted);
        endpoint.verdicts.lock().unwrap().insert(
            rejected.id.clone(),
            SubmissionVerdict::Rejected {
                reason: "RUT receptor inválido".to_string(),
            },
        );

        worker.submit_pending().await.unwrap();
        worker.check_verdicts().await.unwrap();

        let a = db.documents().get_by_id(&accepted.id).await.unwrap().unwrap();
        assert_eq!(a.status, DteStatus::Accepted);

        let r = db.documents().get_by_id(&rejected.id).await.unwrap().unwrap();
        assert_eq!(r.status, DteStatus::Rejected);
        // The rejected folio stays consumed on the stored row
        assert_eq!(r.folio, 4);
    }

    #[tokio::test]
    async fn test_processing_verdict_leaves_document_sent() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let (db, mut worker) = setup(Arc::clone(&endpoint)).await;

        let doc = pending_document("sale-5", 5);
        db.documents().insert(&doc).await.unwrap();

        worker.submit_pending().await.unwrap();
        worker.check_verdicts().await.unwrap();

        let stored = db.documents().get_by_id(&doc.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DteStatus::Sent);
    }

    #[tokio::test]
    async fn test_attempt_limit_skips_document() {
        let endpoint = Arc::new(FakeEndpoint::default());
        *endpoint.fail_submits.lock().unwrap() = u32::MAX;
        let (db, mut worker) = setup(Arc::clone(&endpoint)).await;

        let doc = pending_document("sale-6", 6);
        db.documents().insert(&doc).await.unwrap();

        for _ in 0..test_config().submission.max_attempts {
            worker.submit_pending().await.unwrap();
        }

        // Over the limit: skipped, but never dropped
        *endpoint.fail_submits.lock().unwrap() = 0;
        worker.submit_pending().await.unwrap();
        let pending = db.documents().pending_for_submission(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(endpoint.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unresponsive_endpoint_counts_as_a_failed_attempt() {
        let endpoint = Arc::new(FakeEndpoint::default());
        *endpoint.hang.lock().unwrap() = true;
        let (db, mut worker) = setup(Arc::clone(&endpoint)).await;

        let doc = pending_document("sale-7", 7);
        db.documents().insert(&doc).await.unwrap();

        // The per-attempt timeout fires; the cycle returns instead of hanging
        worker.submit_pending().await.unwrap();

        let pending = db.documents().pending_for_submission(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);

        // Endpoint answers again; the next cycle drains it
        *endpoint.hang.lock().unwrap() = false;
        worker.submit_pending().await.unwrap();
        assert!(db.documents().pending_for_submission(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unresponsive_verdict_query_leaves_document_sent() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let (db, mut worker) = setup(Arc::clone(&endpoint)).await;

        let doc = pending_document("sale-8", 8);
        db.documents().insert(&doc).await.unwrap();
        worker.submit_pending().await.unwrap();

        *endpoint.hang.lock().unwrap() = true;
        worker.check_verdicts().await.unwrap();

        let stored = db.documents().get_by_id(&doc.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DteStatus::Sent);
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_loop() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
        let (worker, handle) = SubmissionWorker::new(db, test_config(), endpoint);

        let task = tokio::spawn(worker.run());
        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
