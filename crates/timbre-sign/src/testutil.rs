//! Test fixtures for this crate's unit tests.
//!
//! Production CAFs are issued by the authority; these are structurally
//! identical stand-ins with freshly generated keys.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;

/// Renders a well-formed CAF document for type `td` covering `[from, to]`.
/// 1024-bit keys keep test runs fast.
pub fn caf_xml(td: u32, from: i64, to: i64) -> String {
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    let pem = key.to_pkcs1_pem(rsa::pkcs1::LineEnding::LF).unwrap();
    let m = STANDARD.encode(key.n().to_bytes_be());
    let e = STANDARD.encode(key.e().to_bytes_be());

    format!(
        "<AUTORIZACION><CAF version=\"1.0\"><DA><RE>76086428-5</RE>\
         <RS>FARMACIA TEST LTDA</RS><TD>{td}</TD><RNG><D>{from}</D><H>{to}</H></RNG>\
         <FA>2026-05-01</FA><RSAPK><M>{m}</M><E>{e}</E></RSAPK><IDK>100</IDK></DA>\
         <FRMA algoritmo=\"SHA1withRSA\">authsig==</FRMA></CAF>\
         <RSASK>{pem}</RSASK><RSAPUBK>pub</RSAPUBK></AUTORIZACION>",
        pem = pem.as_str(),
    )
}
