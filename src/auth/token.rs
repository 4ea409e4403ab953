use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// `n` random bytes from the OS, hex encoded.
pub fn random_hex(n: usize) -> String {
    let mut buf = vec![0u8; n];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Split password-reset token of the form `<selector>.<verifier>`.
///
/// The selector is stored in clear and used for lookup; only the SHA-256 of
/// the verifier is stored, and it is compared in constant time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetToken {
    pub selector: String,
    pub verifier: String,
}

const SELECTOR_BYTES: usize = 16;
const VERIFIER_BYTES: usize = 32;

impl ResetToken {
    pub fn generate() -> Self {
        Self {
            selector: random_hex(SELECTOR_BYTES),
            verifier: random_hex(VERIFIER_BYTES),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (selector, verifier) = raw.trim().split_once('.')?;
        let well_formed = |s: &str, n: usize| {
            s.len() == n * 2 && s.bytes().all(|b| b.is_ascii_hexdigit())
        };
        if !well_formed(selector, SELECTOR_BYTES) || !well_formed(verifier, VERIFIER_BYTES) {
            return None;
        }
        Some(Self {
            selector: selector.to_ascii_lowercase(),
            verifier: verifier.to_ascii_lowercase(),
        })
    }

    pub fn verifier_hash(&self) -> String {
        sha256_hex(&self.verifier)
    }

    pub fn matches(&self, stored_hash: &str) -> bool {
        bool::from(self.verifier_hash().as_bytes().ct_eq(stored_hash.as_bytes()))
    }

    pub fn encode(&self) -> String {
        format!("{}.{}", self.selector, self.verifier)
    }
}
