//! Per-action nonce: an order-independent fingerprint of an action's
//! derived inputs.
//!
//! Each (root-relative path, digest) pair is hashed on its own with BLAKE3
//! and XOR-folded into a 32-byte state, so the result depends only on the
//! set of pairs. The state is rendered as lowercase unpadded base32 and cut
//! to the configured length (25 chars = 125 bits by default).

use crate::artifact::Digest;

const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// XOR accumulator over per-input fingerprints.
#[derive(Debug, Clone, Default)]
pub struct NonceBuilder {
    state: [u8; 32],
}

impl NonceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one input into the state.
    pub fn add(&mut self, root_relative_path: &str, digest: &Digest) {
        let mut hasher = blake3::Hasher::new();
        // Length prefixes keep ("ab", "c") distinct from ("a", "bc").
        hasher.update(&(root_relative_path.len() as u64).to_le_bytes());
        hasher.update(root_relative_path.as_bytes());
        hasher.update(&(digest.as_bytes().len() as u64).to_le_bytes());
        hasher.update(digest.as_bytes());
        let fingerprint = hasher.finalize();

        for (acc, byte) in self.state.iter_mut().zip(fingerprint.as_bytes()) {
            *acc ^= byte;
        }
    }

    /// Encode the first `len` base32 characters of the folded state.
    pub fn finish(&self, len: usize) -> String {
        let mut encoded = encode_base32(&self.state);
        encoded.truncate(len);
        encoded
    }
}

/// RFC 4648 base32, lowercase, without padding.
fn encode_base32(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            let index = ((buffer >> bits) & 0x1f) as usize;
            out.push(BASE32_ALPHABET[index] as char);
        }
    }
    if bits > 0 {
        let index = ((buffer << (5 - bits)) & 0x1f) as usize;
        out.push(BASE32_ALPHABET[index] as char);
    }
    out
}
