//! Checksum derivation for the StreamChat backend.
//!
//! The backend authenticates every call with an `x-cursor-checksum` header.
//! Locally it is built from the token and the current 30-minute window:
//!
//!   checksum = base64_nopad(mix(window_bytes(ts)))
//!              || hex(sha256(token segment 1))
//!              || "/" || hex(sha256(token))
//!
//! The leading six bytes are a best-known approximation of the official
//! client. The two digests are exact.
//!
//! Also here: the token fingerprint used as a cache key, and the
//! `x-client-key` derivation. Neither is reversible to the token.

use std::fmt;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Initial value of the running byte in [`mix`].
pub const MIX_SEED: u8 = 165;

/// Suffix appended to the token before hashing it into `x-client-key`.
const CLIENT_KEY_SUFFIX: &str = "--client-key";

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Six-byte encoding of a window timestamp.
///
/// Bytes 0-1 hold the low 16 bits, bytes 2-5 the low 32 bits, all big-endian.
pub fn window_bytes(timestamp: i64) -> [u8; 6] {
    let [b0, b1, b2, b3] = (timestamp as u32).to_be_bytes();
    [b2, b3, b0, b1, b2, b3]
}

/// Obfuscate `data` with a running byte.
///
/// `out[i] = (data[i] ^ t) + i (mod 256)`, after which `t` becomes `out[i]`.
/// Each output byte feeds the next, so the pass is strictly left to right.
pub fn mix(data: [u8; 6]) -> [u8; 6] {
    let mut out = data;
    out.iter_mut()
        .enumerate()
        .fold(MIX_SEED, |t, (i, byte)| {
            *byte = (*byte ^ t).wrapping_add(i as u8);
            *byte
        });
    out
}

/// Derive the checksum for `token` in the window starting at `timestamp`.
///
/// The token must have at least two '.'-separated segments; the second one
/// salts the middle digest.
pub fn derive(token: &str, timestamp: i64) -> Result<String, ChecksumError> {
    let salt = token
        .split('.')
        .nth(1)
        .ok_or(ChecksumError::MalformedToken { segments: 1 })?;

    let prefix = STANDARD_NO_PAD.encode(mix(window_bytes(timestamp)));
    Ok(format!(
        "{prefix}{}/{}",
        sha256_hex(salt.as_bytes()),
        sha256_hex(token.as_bytes())
    ))
}

/// `x-client-key` header value: `hex(sha256(token + "--client-key"))`.
pub fn client_key(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.update(CLIENT_KEY_SUFFIX.as_bytes());
    hex::encode(hasher.finalize())
}

// ── Fingerprint ───────────────────────────────────────────────────────────────

/// One-way cache key for a token.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(token: &str) -> Self {
        Self(sha256_hex(token.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({}..)", &self.0[..12])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChecksumError {
    #[error("malformed token: expected at least 2 '.'-separated segments, found {segments}")]
    MalformedToken { segments: usize },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
