//! Wire signature for the hosted gateway.
//!
//! The gateway requires an MD5 digest over the URL-encoded `key=value&...`
//! string, fields in wire order, optionally suffixed with a shared
//! passphrase. MD5 here is a protocol compatibility constraint of the remote
//! endpoint; swapping the algorithm means failing every signature check on
//! their side.

use md5::{Digest, Md5};

/// Percent-encodes a value the way the gateway expects: space becomes `+`,
/// `A-Za-z0-9 - _ . *` pass through, every other byte becomes `%XX` with
/// uppercase hex.
pub fn form_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'*' => {
                out.push(*byte as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Signs and verifies gateway payloads. Field order is significant on both
/// sides: outbound payloads sign in build order, inbound notifications verify
/// in received order with the `signature` field excluded.
#[derive(Clone, Debug)]
pub struct GatewaySignatureScheme {
    passphrase: Option<String>,
}

impl GatewaySignatureScheme {
    pub fn new(passphrase: Option<String>) -> Self {
        Self { passphrase }
    }

    /// The exact string the digest covers. Values are trimmed and encoded;
    /// keys are taken as-is.
    pub fn signature_base(&self, fields: &[(String, String)]) -> String {
        let mut parts: Vec<String> = fields
            .iter()
            .map(|(key, value)| format!("{key}={}", form_encode(value.trim())))
            .collect();
        if let Some(passphrase) = &self.passphrase {
            parts.push(format!("passphrase={}", form_encode(passphrase.trim())));
        }
        parts.join("&")
    }

    pub fn sign(&self, fields: &[(String, String)]) -> String {
        let mut hasher = Md5::new();
        hasher.update(self.signature_base(fields).as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn verify(&self, fields: &[(String, String)], provided: &str) -> bool {
        self.sign(fields) == provided.trim().to_ascii_lowercase()
    }
}
