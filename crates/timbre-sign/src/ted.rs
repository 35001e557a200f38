//! # TED Module
//!
//! Builds and signs the "Timbre Electrónico Digital" — the descriptor
//! embedded in every document and printed as the receipt barcode.
//!
//! ## Descriptor Layout (DD)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  <DD>                                                                   │
//! │    <RE>    issuer RUT                                                   │
//! │    <TD>    document type code                                           │
//! │    <F>     folio                                                        │
//! │    <FE>    issue date                                                   │
//! │    <RR>    receiver RUT     ← only when the document has a receiver    │
//! │    <RSR>   receiver name    ← only when the document has a receiver    │
//! │    <MNT>   total amount                                                 │
//! │    <IT1>   first item description (≤ 40 chars)                          │
//! │    <CAF>   the raw authority-signed CAF block, verbatim                 │
//! │    <TSTED> signing timestamp                                            │
//! │  </DD>                                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Canonicalization
//! The DD is rendered as a single line with no inter-element whitespace;
//! those exact bytes are signed, and the signed bytes are embedded verbatim
//! in the TED. Re-serializing a signed DD is forbidden — any change to any
//! field invalidates the signature.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use timbre_core::xml::escape_text;
use timbre_core::DteType;

use crate::caf::Caf;
use crate::crypto;
use crate::error::{SignError, SignResult};

/// First-item descriptions on the TED are capped at 40 characters.
const IT1_MAX_CHARS: usize = 40;

// =============================================================================
// TED Descriptor
// =============================================================================

/// The structured field set of the DD block. Immutable once signed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TedDescriptor {
    /// Issuer RUT (`RE`).
    pub issuer_rut: String,
    /// Document kind (`TD`).
    pub dte_type: DteType,
    /// Folio (`F`).
    pub folio: i64,
    /// Issue date (`FE`).
    pub issue_date: NaiveDate,
    /// Receiver RUT (`RR`), when the document carries a receiver.
    pub receiver_rut: Option<String>,
    /// Receiver name (`RSR`), when the document carries a receiver.
    pub receiver_name: Option<String>,
    /// Document total (`MNT`).
    pub amount: i64,
    /// First item description (`IT1`), truncated to 40 chars.
    pub first_item: String,
    /// The raw CAF block, re-embedded verbatim.
    pub caf_block: String,
    /// Signing timestamp (`TSTED`).
    pub signed_at: DateTime<Utc>,
}

impl TedDescriptor {
    /// Assembles the descriptor field set for a document.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        caf: &Caf,
        dte_type: DteType,
        folio: i64,
        issue_date: NaiveDate,
        receiver: Option<(&str, &str)>,
        amount: i64,
        first_item: &str,
        signed_at: DateTime<Utc>,
    ) -> Self {
        TedDescriptor {
            issuer_rut: caf.issuer_rut.clone(),
            dte_type,
            folio,
            issue_date,
            receiver_rut: receiver.map(|(rut, _)| rut.to_string()),
            receiver_name: receiver.map(|(_, name)| name.to_string()),
            amount,
            first_item: first_item.chars().take(IT1_MAX_CHARS).collect(),
            caf_block: caf.caf_block.clone(),
            signed_at,
        }
    }

    /// Renders the canonical DD bytes — single line, no inter-element
    /// whitespace. This exact byte sequence is what gets signed.
    pub fn canonical_dd(&self) -> String {
        let mut dd = String::with_capacity(512 + self.caf_block.len());

        dd.push_str("<DD>");
        dd.push_str(&format!("<RE>{}</RE>", self.issuer_rut));
        dd.push_str(&format!("<TD>{}</TD>", self.dte_type.code()));
        dd.push_str(&format!("<F>{}</F>", self.folio));
        dd.push_str(&format!("<FE>{}</FE>", self.issue_date.format("%Y-%m-%d")));
        if let (Some(rut), Some(name)) = (&self.receiver_rut, &self.receiver_name) {
            dd.push_str(&format!("<RR>{}</RR>", rut));
            dd.push_str(&format!("<RSR>{}</RSR>", escape_text(name)));
        }
        dd.push_str(&format!("<MNT>{}</MNT>", self.amount));
        dd.push_str(&format!("<IT1>{}</IT1>", escape_text(&self.first_item)));
        dd.push_str(&self.caf_block);
        dd.push_str(&format!(
            "<TSTED>{}</TSTED>",
            self.signed_at.format("%Y-%m-%dT%H:%M:%S")
        ));
        dd.push_str("</DD>");

        dd
    }

    /// Signs the canonical DD with the CAF's private key and returns the
    /// complete TED element.
    ///
    /// Fail-closed: key extraction or signing failure aborts the issuance;
    /// there is no placeholder-signature fallback.
    pub fn sign(&self, caf: &Caf) -> SignResult<String> {
        caf.ensure_covers(self.dte_type)?;

        let key = caf.private_key()?;
        let dd = self.canonical_dd();
        let signature = crypto::sign(&key, dd.as_bytes())?;
        let frmt = STANDARD.encode(signature);

        debug!(folio = self.folio, dte_type = self.dte_type.code(), "Signed TED");

        Ok(format!(
            "<TED version=\"1.0\">{dd}<FRMT algoritmo=\"SHA1withRSA\">{frmt}</FRMT></TED>"
        ))
    }
}

// =============================================================================
// Verification
// =============================================================================

/// Verifies a signed TED against the CAF public key.
///
/// Used by tests and by operators auditing issued documents; the signed DD
/// bytes are taken verbatim from the TED, never re-serialized.
pub fn verify_ted(ted_xml: &str, caf: &Caf) -> SignResult<()> {
    let dd = raw_dd_block(ted_xml)?;

    let frmt_open = ted_xml
        .find("<FRMT")
        .ok_or_else(|| SignError::VerificationFailed("missing <FRMT>".to_string()))?;
    let frmt_start = ted_xml[frmt_open..]
        .find('>')
        .map(|i| frmt_open + i + 1)
        .ok_or_else(|| SignError::VerificationFailed("malformed <FRMT>".to_string()))?;
    let frmt_end = ted_xml[frmt_start..]
        .find("</FRMT>")
        .map(|i| frmt_start + i)
        .ok_or_else(|| SignError::VerificationFailed("unterminated <FRMT>".to_string()))?;

    let signature = STANDARD
        .decode(ted_xml[frmt_start..frmt_end].trim())
        .map_err(|e| SignError::VerificationFailed(format!("bad signature encoding: {e}")))?;

    crypto::verify(&caf.public_key()?, dd.as_bytes(), &signature)
}

/// Returns the `<DD>…</DD>` block byte-for-byte as embedded.
fn raw_dd_block(ted_xml: &str) -> SignResult<&str> {
    let start = ted_xml
        .find("<DD>")
        .ok_or_else(|| SignError::VerificationFailed("missing <DD>".to_string()))?;
    let close = "</DD>";
    let end = ted_xml[start..]
        .find(close)
        .ok_or_else(|| SignError::VerificationFailed("unterminated <DD>".to_string()))?;
    Ok(&ted_xml[start..start + end + close.len()])
}

// =============================================================================
// Unit Tests
// =============================================================================
