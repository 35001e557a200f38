//! # Document Builder
//!
//! Turns a finalized sale into a signed, stored DTE.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DteBuilder::issue                               │
//! │                                                                         │
//! │  1. GATE       external-card sale → no document at all                  │
//! │  2. IDEMPOTENT sale_id already issued → return the stored document      │
//! │  3. VALIDATE   RUTs, receiver/reference rules, item shape, totals       │
//! │                ── everything above runs BEFORE a folio is touched ──    │
//! │  4. ALLOCATE   assign_folio (atomic, durable counter)                   │
//! │                ── everything below must void the folio on failure ──    │
//! │  5. SPLIT      net / IVA / exempt from line items                       │
//! │  6. SIGN       canonical DD → SHA1withRSA → TED                         │
//! │  7. RENDER     full document XML, TED embedded verbatim                 │
//! │  8. CHECK      structural check against the type's schema variant       │
//! │  9. PERSIST    status 'pending', ready for the submission worker        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A folio consumed by a failed assembly is voided and logged, never
//! returned to the pool: the authority tolerates gaps, not duplicates.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use timbre_core::validation::{validate_build_preconditions, validate_rut};
use timbre_core::xml::structural_check;
use timbre_core::{
    DteDocument, DteItem, DteReference, DteStatus, DteType, Issuer, PaymentMethod, Receiver,
    TaxBreakdown,
};
use timbre_db::{Database, DbError, FolioAssignment};
use timbre_sign::TedDescriptor;

use crate::config::IssuerConfig;
use crate::error::{IssueError, IssueResult};

// =============================================================================
// Request / Outcome
// =============================================================================

/// A finalized sale, as handed over by the POS flow.
#[derive(Debug, Clone)]
pub struct SaleRequest {
    /// Sale identifier — the idempotency key.
    pub sale_id: String,
    /// Document kind to issue.
    pub dte_type: DteType,
    /// How the sale was paid. Decides whether a document is issued at all.
    pub payment_method: PaymentMethod,
    /// Line items, snapshotted at sale time.
    pub items: Vec<DteItem>,
    /// Total the POS charged, in pesos. Must equal the item line sum.
    pub total: i64,
    /// Receiver, required for the Factura family and Notas.
    pub receiver: Option<Receiver>,
    /// Original document reference, required for Notas.
    pub reference: Option<DteReference>,
}

/// What came out of an issue call.
#[derive(Debug, Clone)]
pub enum IssueOutcome {
    /// A new document was built, signed and stored.
    Issued(DteDocument),
    /// The sale already had a document; the stored one is returned untouched.
    AlreadyIssued(DteDocument),
    /// The payment method carries its own fiscal record; no document needed.
    NotRequired,
}

impl IssueOutcome {
    /// The document, when the outcome carries one.
    pub fn document(&self) -> Option<&DteDocument> {
        match self {
            IssueOutcome::Issued(doc) | IssueOutcome::AlreadyIssued(doc) => Some(doc),
            IssueOutcome::NotRequired => None,
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builds, signs and stores documents for one emitting taxpayer.
#[derive(Clone)]
pub struct DteBuilder {
    db: Arc<Database>,
    issuer: Issuer,
}

impl DteBuilder {
    /// Creates a builder for the configured issuer.
    ///
    /// The issuer RUT is validated once here rather than on every sale.
    pub fn new(db: Arc<Database>, config: &IssuerConfig) -> IssueResult<Self> {
        validate_rut(&config.issuer.rut)?;
        Ok(DteBuilder {
            db,
            issuer: config.issuer.clone(),
        })
    }

    /// Issues the document for a finalized sale.
    #[instrument(skip(self, request), fields(sale_id = %request.sale_id, dte_type = request.dte_type.code()))]
    pub async fn issue(&self, request: SaleRequest) -> IssueResult<IssueOutcome> {
        // 1. Fiscalization gate
        if !request.payment_method.requires_fiscal_document() {
            info!("External-card sale; the card voucher is the fiscal record");
            return Ok(IssueOutcome::NotRequired);
        }

        // 2. Idempotency: one sale, one document, forever
        if let Some(existing) = self.db.documents().find_by_sale_id(&request.sale_id).await? {
            info!(id = %existing.id, folio = existing.folio, "Sale already issued");
            return Ok(IssueOutcome::AlreadyIssued(existing));
        }

        // 3. Preconditions — a validation failure must never burn a folio
        validate_build_preconditions(
            request.dte_type,
            &request.items,
            request.total,
            request.receiver.as_ref(),
            request.reference.as_ref(),
        )?;

        // 4. Allocate. From here on failure voids the folio.
        let assignment = self.db.caf_ranges().assign_folio(request.dte_type).await?;

        match self.assemble(&request, &assignment).await {
            Ok(document) => Ok(IssueOutcome::Issued(document)),
            Err(err) => {
                // A failed void must not mask the assembly error the caller
                // needs; the gap audit can be reconciled later
                if let Err(void_err) = self
                    .db
                    .caf_ranges()
                    .void_folio(
                        &assignment.caf_id,
                        request.dte_type,
                        assignment.folio,
                        &err.to_string(),
                    )
                    .await
                {
                    error!(
                        folio = assignment.folio,
                        %void_err,
                        "Failed to record the voided folio"
                    );
                }

                // A concurrent build for the same sale won the insert race.
                // Their document stands; ours burned its folio.
                if let IssueError::Db(DbError::UniqueViolation { ref field, .. }) = err {
                    if field.contains("sale_id") {
                        warn!(sale_id = %request.sale_id, "Lost idempotency race; using stored document");
                        if let Some(existing) =
                            self.db.documents().find_by_sale_id(&request.sale_id).await?
                        {
                            return Ok(IssueOutcome::AlreadyIssued(existing));
                        }
                    }
                }

                Err(err)
            }
        }
    }

    /// Steps 5-9: everything downstream of folio allocation.
    async fn assemble(
        &self,
        request: &SaleRequest,
        assignment: &FolioAssignment,
    ) -> IssueResult<DteDocument> {
        let breakdown = split_taxes(request)?;
        let now = Utc::now();

        // 6. Sign the TED. Fail-closed: no signature, no document.
        let first_item = request
            .items
            .first()
            .map(|i| i.name.as_str())
            .unwrap_or_default();
        let receiver_fields = request
            .receiver
            .as_ref()
            .map(|r| (r.rut.as_str(), r.razon_social.as_str()));
        let descriptor = TedDescriptor::new(
            &assignment.caf,
            request.dte_type,
            assignment.folio,
            now.date_naive(),
            receiver_fields,
            breakdown.total,
            first_item,
            now,
        );
        let ted_xml = descriptor.sign(&assignment.caf)?;

        // 7. Assemble the full document
        let mut document = DteDocument {
            id: DteDocument::derive_id(request.dte_type, &self.issuer.rut, assignment.folio),
            sale_id: request.sale_id.clone(),
            dte_type: request.dte_type,
            folio: assignment.folio,
            issuer: self.issuer.clone(),
            receiver: request.receiver.clone(),
            items: request.items.clone(),
            reference: request.reference.clone(),
            breakdown,
            ted_xml,
            xml: String::new(),
            status: DteStatus::Pending,
            track_id: None,
            issued_at: now,
            updated_at: now,
        };
        document.xml = document.render_xml();

        // 8. Structural check: a malformed document is blocked here,
        //    on this machine, before anything reaches the authority
        structural_check(&document.xml, request.dte_type)?;

        // 9. Persist as 'pending'
        self.db.documents().insert(&document).await?;

        info!(
            id = %document.id,
            folio = document.folio,
            total = document.breakdown.total,
            "Document issued"
        );

        Ok(document)
    }
}

// =============================================================================
// Tax Split
// =============================================================================

/// Splits the sale total into net / IVA / exempt from the line items.
///
/// Exempt document kinds (34, 41) treat every line as exempt regardless of
/// per-item flags; mixed documents split by the item flag.
fn split_taxes(request: &SaleRequest) -> IssueResult<TaxBreakdown> {
    if request.dte_type.is_exempt() {
        return Ok(TaxBreakdown::with_exempt(0, request.total)?);
    }

    let exempt: i64 = request
        .items
        .iter()
        .filter(|i| i.exempt)
        .map(|i| i.line_total)
        .sum();
    let gross_taxable = request.total - exempt;

    Ok(TaxBreakdown::with_exempt(gross_taxable, exempt)?)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn request(dte_type: DteType, items: Vec<DteItem>, total: i64) -> SaleRequest {
        SaleRequest {
            sale_id: "sale-1".to_string(),
            dte_type,
            payment_method: PaymentMethod::Cash,
            items,
            total,
            receiver: None,
            reference: None,
        }
    }

    #[test]
    fn test_split_plain_taxable_sale() {
        let r = request(
            DteType::Boleta,
            vec![DteItem::new(1, "Ibuprofeno 400mg", 1, 15990)],
            15990,
        );
        let b = split_taxes(&r).unwrap();
        assert_eq!((b.net, b.iva, b.exempt, b.total), (13437, 2553, 0, 15990));
    }

    #[test]
    fn test_split_mixed_sale() {
        let mut magistral = DteItem::new(2, "Preparado magistral", 1, 5000);
        magistral.exempt = true;
        let r = request(
            DteType::Boleta,
            vec![DteItem::new(1, "Paracetamol", 1, 119), magistral],
            5119,
        );
        let b = split_taxes(&r).unwrap();
        assert_eq!((b.net, b.iva, b.exempt, b.total), (100, 19, 5000, 5119));
        assert!(b.reconciles());
    }

    #[test]
    fn test_split_exempt_document_kind() {
        let r = request(
            DteType::BoletaExenta,
            vec![DteItem::new(1, "Consulta", 1, 10000)],
            10000,
        );
        let b = split_taxes(&r).unwrap();
        assert_eq!((b.net, b.iva, b.exempt, b.total), (0, 0, 10000, 10000));
    }
}
