//! # Barcode Payload Module
//!
//! Encodes a signed TED for the printing collaborator's PDF417 barcode.
//! Rendering itself happens outside this subsystem; this module only
//! produces the payload bytes.

/// Canonicalizes a TED for barcode rendering and encodes it as
/// ISO-8859-1-compatible bytes.
///
/// Whitespace runs (newlines inside PEM-wrapped CAF blocks, indentation)
/// collapse to a single space and the result is trimmed — barcode scanners
/// reconstruct the TED from the payload, so the payload must be stable
/// regardless of how the source XML was pretty-printed.
///
/// Characters outside Latin-1 are replaced with `?`; the printer character
/// set cannot represent them.
pub fn encode_barcode(ted_xml: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(ted_xml.len());
    let mut in_whitespace = false;

    for c in ted_xml.trim().chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push(b' ');
                in_whitespace = true;
            }
            continue;
        }
        in_whitespace = false;

        let code = c as u32;
        if code <= 0xFF {
            out.push(code as u8);
        } else {
            out.push(b'?');
        }
    }

    out
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace_runs() {
        let ted = "<TED>\n  <DD>\n    <F>42</F>\n  </DD>\n</TED>";
        let payload = encode_barcode(ted);
        assert_eq!(
            String::from_utf8_lossy(&payload),
            "<TED> <DD> <F>42</F> </DD> </TED>"
        );
    }

    #[test]
    fn test_already_canonical_input_is_stable() {
        let ted = "<TED><DD><F>42</F></DD></TED>";
        assert_eq!(encode_barcode(ted), ted.as_bytes());
    }

    #[test]
    fn test_latin1_characters_survive() {
        let payload = encode_barcode("<IT1>Jarabe Pediátrico</IT1>");
        // 'á' is 0xE1 in Latin-1
        assert!(payload.contains(&0xE1));
    }

    #[test]
    fn test_non_latin1_replaced() {
        let payload = encode_barcode("<IT1>漢</IT1>");
        assert!(payload.contains(&b'?'));
    }
}
