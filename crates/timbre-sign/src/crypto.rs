//! # Crypto Primitives
//!
//! SHA1withRSA (PKCS#1 v1.5) over the key material carried inside a CAF.
//!
//! The digest choice follows what the authority currently mandates for the
//! TED `FRMT` element; it is isolated here so a future algorithm change
//! touches exactly one module.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;

use crate::error::{SignError, SignResult};

/// Parses the RSA private key embedded in a CAF (`RSASK` element).
///
/// CAFs carry PKCS#1 PEM (`BEGIN RSA PRIVATE KEY`); PKCS#8 is accepted as
/// a fallback for re-wrapped key stores.
pub fn parse_private_key(pem: &str) -> SignResult<RsaPrivateKey> {
    let pem = pem.trim();

    if let Ok(key) = RsaPrivateKey::from_pkcs1_pem(pem) {
        return Ok(key);
    }

    RsaPrivateKey::from_pkcs8_pem(pem)
        .map_err(|e| SignError::KeyExtraction(format!("unsupported private key format: {e}")))
}

/// Reconstructs the CAF public key from its base64 big-endian components
/// (`RSAPK/M` and `RSAPK/E`).
pub fn public_key_from_components(modulus_b64: &str, exponent_b64: &str) -> SignResult<RsaPublicKey> {
    let modulus = STANDARD
        .decode(modulus_b64.trim())
        .map_err(|e| SignError::KeyExtraction(format!("bad modulus encoding: {e}")))?;
    let exponent = STANDARD
        .decode(exponent_b64.trim())
        .map_err(|e| SignError::KeyExtraction(format!("bad exponent encoding: {e}")))?;

    RsaPublicKey::new(
        BigUint::from_bytes_be(&modulus),
        BigUint::from_bytes_be(&exponent),
    )
    .map_err(|e| SignError::KeyExtraction(format!("invalid public key components: {e}")))
}

/// Signs `data` with SHA1withRSA (PKCS#1 v1.5).
///
/// Returns the raw signature bytes; callers base64-encode for the `FRMT`
/// element. Any failure aborts the issuance — fail-closed.
pub fn sign(key: &RsaPrivateKey, data: &[u8]) -> SignResult<Vec<u8>> {
    let signing_key = SigningKey::<Sha1>::new(key.clone());
    let signature = signing_key
        .try_sign(data)
        .map_err(|e| SignError::SigningFailed(e.to_string()))?;
    Ok(signature.to_vec())
}

/// Verifies a SHA1withRSA signature against a public key.
pub fn verify(key: &RsaPublicKey, data: &[u8], signature: &[u8]) -> SignResult<()> {
    let verifying_key = VerifyingKey::<Sha1>::new(key.clone());
    let signature = Signature::try_from(signature)
        .map_err(|e| SignError::VerificationFailed(format!("malformed signature: {e}")))?;

    verifying_key
        .verify(data, &signature)
        .map_err(|_| SignError::VerificationFailed("signature does not verify".to_string()))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::EncodeRsaPrivateKey;
    use rsa::traits::PublicKeyParts;

    fn test_key() -> RsaPrivateKey {
        // 1024 bits keeps the test fast; production CAF keys are issued by
        // the authority, not generated here
        RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap()
    }

    #[test]
    fn test_sign_and_verify_round_trip() {
        let key = test_key();
        let data = b"<DD><RE>76086428-5</RE><TD>39</TD><F>1042</F></DD>";

        let sig = sign(&key, data).unwrap();
        verify(&key.to_public_key(), data, &sig).unwrap();
    }

    #[test]
    fn test_tampered_data_fails_verification() {
        let key = test_key();
        let sig = sign(&key, b"folio 1042").unwrap();

        let err = verify(&key.to_public_key(), b"folio 1043", &sig).unwrap_err();
        assert!(matches!(err, SignError::VerificationFailed(_)));
    }

    #[test]
    fn test_pkcs1_pem_round_trip() {
        let key = test_key();
        let pem = key.to_pkcs1_pem(rsa::pkcs1::LineEnding::LF).unwrap();

        let parsed = parse_private_key(&pem).unwrap();
        assert_eq!(parsed.n(), key.n());
    }

    #[test]
    fn test_garbage_key_is_rejected() {
        let err = parse_private_key("not a key").unwrap_err();
        assert!(matches!(err, SignError::KeyExtraction(_)));
    }

    #[test]
    fn test_public_key_from_components() {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        let key = test_key();
        let m = STANDARD.encode(key.n().to_bytes_be());
        let e = STANDARD.encode(key.e().to_bytes_be());

        let rebuilt = public_key_from_components(&m, &e).unwrap();
        let sig = sign(&key, b"payload").unwrap();
        verify(&rebuilt, b"payload", &sig).unwrap();
    }
}
