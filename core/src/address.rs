//! Peer address validation and normalization.
//!
//! Every key used by the conversation index is produced through
//! [`normalize`]; raw user or network text is never used directly. Two
//! textual variants of the same address therefore always resolve to the
//! same [`PeerAddress`].

use sha3::{Digest, Keccak256};

use crate::error::SessionError;

/// Canonical (EIP-55 checksummed) identifier of a messaging counterparty.
///
/// Only constructible through [`normalize`], so holding one implies the
/// address is well-formed and in canonical case.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Abbreviated form for notices: first 8 characters plus an ellipsis.
    pub fn short(&self) -> String {
        format!("{}...", &self.0[..8])
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Syntactic check: `0x` prefix followed by exactly 40 hex digits, any case.
///
/// Mixed-case input is accepted regardless of whether its case matches the
/// EIP-55 checksum; [`normalize`] re-checksums, so case variants of one
/// address always converge on a single canonical form.
pub fn is_valid(raw: &str) -> bool {
    let s = raw.trim();
    let Some(hex_part) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) else {
        return false;
    };
    hex_part.len() == 40 && hex_part.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Convert raw text into the canonical checksummed form.
pub fn normalize(raw: &str) -> Result<PeerAddress, SessionError> {
    if !is_valid(raw) {
        return Err(SessionError::InvalidAddress(raw.trim().to_string()));
    }
    let lower = raw.trim()[2..].to_ascii_lowercase();
    Ok(PeerAddress(to_checksum_case(&lower)))
}

/// EIP-55: uppercase each hex letter whose corresponding nibble of
/// `keccak256(lowercase_hex_address)` is >= 8.
fn to_checksum_case(lower_hex: &str) -> String {
    let digest = Keccak256::digest(lower_hex.as_bytes());
    let hash_hex = hex::encode(digest);
    let hash_bytes = hash_hex.as_bytes();

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, ch) in lower_hex.chars().enumerate() {
        let nibble = (hash_bytes[i] as char).to_digit(16).unwrap_or(0);
        if ch.is_ascii_alphabetic() && nibble >= 8 {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}
