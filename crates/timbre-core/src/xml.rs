//! # Document XML Module
//!
//! Schema-variant serialization of the DTE, markup escaping, and the
//! structural check that gates transmission.
//!
//! ## Schema Variants
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Document Layout by Type                             │
//! │                                                                         │
//! │  <DTE version="1.0">                                                   │
//! │    <Documento ID="DTE-{code}-{rut}-{folio}">                           │
//! │      <Encabezado>                                                      │
//! │        <IdDoc>    TipoDTE, Folio, FchEmis                              │
//! │        <Emisor>   RUTEmisor, RznSoc, GiroEmis, DirOrigen, CmnaOrigen   │
//! │        <Receptor> RUTRecep, RznSocRecep, ...    ← Factura/Notas only   │
//! │        <Totales>  MntNeto, MntExe?, IVA, MntTotal                      │
//! │      <Detalle>*   NroLinDet, NmbItem, QtyItem, PrcItem, MontoItem      │
//! │      <Referencia> TpoDocRef, FolioRef, RazonRef ← Notas only           │
//! │      <TED>        signed descriptor, embedded verbatim                 │
//! │      <TmstFirma>  signing timestamp                                    │
//! │    </Documento>                                                        │
//! │  </DTE>                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Free-text fields (item names, party names, reference reasons) pass
//! through [`escape_text`]; everything else is numeric or controlled
//! vocabulary.

use crate::error::{CoreError, CoreResult};
use crate::tax::TaxBreakdown;
use crate::types::{DteDocument, DteItem};

// =============================================================================
// Escaping
// =============================================================================

/// Escapes the five reserved markup characters in free-text content.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverses [`escape_text`]. Entity order matters: `&amp;` is decoded last
/// so `&amp;lt;` round-trips to the literal `&lt;`.
pub fn unescape_text(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// =============================================================================
// Tag Extraction
// =============================================================================

/// Returns the raw text content of the first `<tag>...</tag>` occurrence.
///
/// This is a deliberately small extractor for the flat, attribute-light
/// element bodies this subsystem deals with (totals, folios, CAF fields).
/// It is not a general XML parser.
pub fn extract_tag<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(&xml[start..end])
}

/// Returns the raw bodies of every `<tag>...</tag>` occurrence, in order.
pub fn extract_all_tags<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut out = Vec::new();
    let mut rest = xml;
    while let Some(pos) = rest.find(&open) {
        let start = pos + open.len();
        let Some(end_rel) = rest[start..].find(&close) else {
            break;
        };
        out.push(&rest[start..start + end_rel]);
        rest = &rest[start + end_rel + close.len()..];
    }
    out
}

// =============================================================================
// Serialization
// =============================================================================

impl DteDocument {
    /// Renders the complete schema-variant document.
    ///
    /// The TED is embedded verbatim: it was signed over its own canonical
    /// bytes and must not be re-serialized.
    pub fn render_xml(&self) -> String {
        let mut xml = String::with_capacity(2048);

        xml.push_str("<DTE version=\"1.0\">");
        xml.push_str(&format!("<Documento ID=\"{}\">", self.id));

        // --- Encabezado ---
        xml.push_str("<Encabezado>");
        xml.push_str(&format!(
            "<IdDoc><TipoDTE>{}</TipoDTE><Folio>{}</Folio><FchEmis>{}</FchEmis></IdDoc>",
            self.dte_type.code(),
            self.folio,
            self.issued_at.format("%Y-%m-%d"),
        ));
        xml.push_str(&format!(
            "<Emisor><RUTEmisor>{}</RUTEmisor><RznSoc>{}</RznSoc><GiroEmis>{}</GiroEmis>\
             <DirOrigen>{}</DirOrigen><CmnaOrigen>{}</CmnaOrigen></Emisor>",
            self.issuer.rut,
            escape_text(&self.issuer.razon_social),
            escape_text(&self.issuer.giro),
            escape_text(&self.issuer.address),
            escape_text(&self.issuer.comuna),
        ));
        if let Some(receiver) = &self.receiver {
            xml.push_str("<Receptor>");
            xml.push_str(&format!("<RUTRecep>{}</RUTRecep>", receiver.rut));
            xml.push_str(&format!(
                "<RznSocRecep>{}</RznSocRecep>",
                escape_text(&receiver.razon_social)
            ));
            if let Some(giro) = &receiver.giro {
                xml.push_str(&format!("<GiroRecep>{}</GiroRecep>", escape_text(giro)));
            }
            if let Some(address) = &receiver.address {
                xml.push_str(&format!("<DirRecep>{}</DirRecep>", escape_text(address)));
            }
            xml.push_str("</Receptor>");
        }
        xml.push_str("<Totales>");
        xml.push_str(&format!("<MntNeto>{}</MntNeto>", self.breakdown.net));
        if self.breakdown.exempt > 0 {
            xml.push_str(&format!("<MntExe>{}</MntExe>", self.breakdown.exempt));
        }
        xml.push_str(&format!("<IVA>{}</IVA>", self.breakdown.iva));
        xml.push_str(&format!("<MntTotal>{}</MntTotal>", self.breakdown.total));
        xml.push_str("</Totales>");
        xml.push_str("</Encabezado>");

        // --- Detalle ---
        for item in &self.items {
            xml.push_str(&format!("<Detalle><NroLinDet>{}</NroLinDet>", item.line_number));
            if item.exempt {
                // IndExe 1 marks an exempt line on a mixed document
                xml.push_str("<IndExe>1</IndExe>");
            }
            xml.push_str(&format!(
                "<NmbItem>{}</NmbItem><QtyItem>{}</QtyItem>\
                 <PrcItem>{}</PrcItem><MontoItem>{}</MontoItem></Detalle>",
                escape_text(&item.name),
                item.quantity,
                item.unit_price,
                item.line_total,
            ));
        }

        // --- Referencia (Notas only) ---
        if let Some(reference) = &self.reference {
            xml.push_str(&format!(
                "<Referencia><TpoDocRef>{}</TpoDocRef><FolioRef>{}</FolioRef>\
                 <RazonRef>{}</RazonRef></Referencia>",
                reference.doc_type.code(),
                reference.folio,
                escape_text(&reference.reason),
            ));
        }

        // --- TED + signing timestamp ---
        xml.push_str(&self.ted_xml);
        xml.push_str(&format!(
            "<TmstFirma>{}</TmstFirma>",
            self.issued_at.format("%Y-%m-%dT%H:%M:%S")
        ));

        xml.push_str("</Documento></DTE>");
        xml
    }
}

// =============================================================================
// Structural Check
// =============================================================================

/// Elements every document must carry, regardless of kind.
const MANDATORY_ELEMENTS: &[&str] = &[
    "Encabezado",
    "TipoDTE",
    "Folio",
    "FchEmis",
    "RUTEmisor",
    "Totales",
    "MntTotal",
    "NmbItem",
    "TED",
    "FRMT",
    "TmstFirma",
];

/// Checks that an element opens anywhere in the document, with or without
/// attributes (`<TED version="1.0">` counts for "TED").
fn has_element(xml: &str, tag: &str) -> bool {
    xml.contains(&format!("<{tag}>")) || xml.contains(&format!("<{tag} "))
}

/// Verifies the serialized document carries every element its schema
/// variant mandates. This is the local gate before a document may be
/// queued for transmission; a failure here blocks the document and maps
/// to the SchemaValidation error category upstream.
pub fn structural_check(xml: &str, dte_type: crate::types::DteType) -> CoreResult<()> {
    for element in MANDATORY_ELEMENTS {
        if !has_element(xml, element) {
            return Err(CoreError::MissingElement {
                element: element.to_string(),
            });
        }
    }

    if dte_type.requires_receiver() && extract_tag(xml, "RUTRecep").is_none() {
        return Err(CoreError::MissingElement {
            element: "RUTRecep".to_string(),
        });
    }

    if dte_type.requires_reference() && extract_tag(xml, "FolioRef").is_none() {
        return Err(CoreError::MissingElement {
            element: "FolioRef".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Re-parsing (round-trip verification)
// =============================================================================

/// Re-parses the totals block of a serialized document.
///
/// Used to verify that serialization lost nothing: the parsed breakdown
/// must equal the breakdown that was rendered.
pub fn parse_totals(xml: &str) -> CoreResult<TaxBreakdown> {
    let totales = extract_tag(xml, "Totales")
        .ok_or_else(|| CoreError::MalformedXml("missing <Totales>".to_string()))?;

    let field = |tag: &str| -> CoreResult<i64> {
        extract_tag(totales, tag)
            .unwrap_or("0")
            .parse::<i64>()
            .map_err(|e| CoreError::MalformedXml(format!("bad <{tag}>: {e}")))
    };

    Ok(TaxBreakdown {
        net: field("MntNeto")?,
        iva: field("IVA")?,
        exempt: field("MntExe")?,
        total: field("MntTotal")?,
    })
}

/// Re-parses the line items of a serialized document.
pub fn parse_items(xml: &str) -> CoreResult<Vec<DteItem>> {
    let mut items = Vec::new();
    for detalle in extract_all_tags(xml, "Detalle") {
        let text = |tag: &str| -> CoreResult<&str> {
            extract_tag(detalle, tag)
                .ok_or_else(|| CoreError::MalformedXml(format!("missing <{tag}> in Detalle")))
        };
        let num = |tag: &str| -> CoreResult<i64> {
            text(tag)?
                .parse::<i64>()
                .map_err(|e| CoreError::MalformedXml(format!("bad <{tag}>: {e}")))
        };

        items.push(DteItem {
            line_number: num("NroLinDet")? as u32,
            name: unescape_text(text("NmbItem")?),
            quantity: num("QtyItem")?,
            unit_price: num("PrcItem")?,
            line_total: num("MontoItem")?,
            exempt: extract_tag(detalle, "IndExe").map(str::trim) == Some("1"),
        });
    }
    Ok(items)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DteReference, DteStatus, DteType, Issuer, Receiver};
    use chrono::{TimeZone, Utc};

    fn issuer() -> Issuer {
        Issuer {
            rut: "76086428-5".to_string(),
            razon_social: "Farmacia Cruz & Vega Ltda".to_string(),
            giro: "Venta de productos farmacéuticos".to_string(),
            address: "Av. Providencia 1234".to_string(),
            comuna: "Providencia".to_string(),
        }
    }

    fn document(dte_type: DteType, receiver: Option<Receiver>) -> DteDocument {
        let items = vec![
            DteItem::new(1, "Paracetamol 500mg <comp>", 2, 1995),
            DteItem::new(2, "Jarabe \"Infantil\"", 1, 12000),
        ];
        let total: i64 = items.iter().map(|i| i.line_total).sum();
        let breakdown = TaxBreakdown::from_gross(total).unwrap();
        let issued_at = Utc.with_ymd_and_hms(2026, 8, 23, 15, 30, 0).unwrap();

        let reference = dte_type.requires_reference().then(|| DteReference {
            doc_type: DteType::Boleta,
            folio: 991,
            reason: "Anula venta".to_string(),
        });

        DteDocument {
            id: DteDocument::derive_id(dte_type, "76086428-5", 1042),
            sale_id: "sale-0001".to_string(),
            dte_type,
            folio: 1042,
            issuer: issuer(),
            receiver,
            items,
            reference,
            breakdown,
            ted_xml: "<TED version=\"1.0\"><DD>dd</DD>\
                      <FRMT algoritmo=\"SHA1withRSA\">sig</FRMT></TED>"
                .to_string(),
            xml: String::new(),
            status: DteStatus::Pending,
            track_id: None,
            issued_at,
            updated_at: issued_at,
        }
    }

    #[test]
    fn test_escape_round_trip() {
        let raw = "A & B <C> \"D\" 'E'";
        let escaped = escape_text(raw);
        assert!(!escaped.contains('<'));
        assert!(!escaped.contains('"'));
        assert_eq!(unescape_text(&escaped), raw);
    }

    #[test]
    fn test_boleta_omits_receiver() {
        let doc = document(DteType::Boleta, None);
        let xml = doc.render_xml();
        assert!(!xml.contains("<Receptor>"));
        assert!(structural_check(&xml, DteType::Boleta).is_ok());
    }

    #[test]
    fn test_factura_includes_receiver() {
        let receiver = Receiver {
            rut: "77123456-0".to_string(),
            razon_social: "Cliente SpA".to_string(),
            giro: Some("Servicios".to_string()),
            address: None,
        };
        let doc = document(DteType::Factura, Some(receiver));
        let xml = doc.render_xml();
        assert!(xml.contains("<RUTRecep>77123456-0</RUTRecep>"));
        assert!(structural_check(&xml, DteType::Factura).is_ok());
    }

    #[test]
    fn test_factura_without_receiver_fails_check() {
        // Rendered as if it were a boleta, checked against the factura schema
        let doc = document(DteType::Boleta, None);
        let xml = doc.render_xml();
        let err = structural_check(&xml, DteType::Factura).unwrap_err();
        assert!(matches!(err, CoreError::MissingElement { element } if element == "RUTRecep"));
    }

    #[test]
    fn test_nota_credito_carries_reference() {
        let receiver = Receiver {
            rut: "77123456-0".to_string(),
            razon_social: "Cliente SpA".to_string(),
            giro: None,
            address: None,
        };
        let doc = document(DteType::NotaCredito, Some(receiver));
        let xml = doc.render_xml();
        assert!(xml.contains("<FolioRef>991</FolioRef>"));
        assert!(structural_check(&xml, DteType::NotaCredito).is_ok());
    }

    #[test]
    fn test_round_trip_preserves_totals_and_items() {
        let mut doc = document(DteType::Boleta, None);
        // Mixed document: the jarabe line is exempt
        doc.items[1].exempt = true;
        doc.breakdown =
            TaxBreakdown::with_exempt(doc.items[0].line_total, doc.items[1].line_total).unwrap();
        let xml = doc.render_xml();
        assert!(xml.contains("<IndExe>1</IndExe>"));

        let totals = parse_totals(&xml).unwrap();
        assert_eq!(totals, doc.breakdown);
        assert!(totals.reconciles());

        let items = parse_items(&xml).unwrap();
        assert_eq!(items.len(), doc.items.len());
        for (parsed, original) in items.iter().zip(&doc.items) {
            assert_eq!(parsed.name, original.name);
            assert_eq!(parsed.quantity, original.quantity);
            assert_eq!(parsed.unit_price, original.unit_price);
            assert_eq!(parsed.line_total, original.line_total);
            assert_eq!(parsed.exempt, original.exempt);
        }
    }

    #[test]
    fn test_extract_all_tags() {
        let xml = "<a>1</a><a>2</a><b>x</b><a>3</a>";
        assert_eq!(extract_all_tags(xml, "a"), vec!["1", "2", "3"]);
        assert!(extract_all_tags(xml, "c").is_empty());
    }
}
