use core::fmt::Write;

use sha2::{Digest, Sha256};

pub const SIDECAR_SUFFIX: &str = ".sha256";

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

pub fn sidecar_path(path: &str) -> String {
    format!("{path}{SIDECAR_SUFFIX}")
}

/// First whitespace-separated token of a sidecar file.
pub fn sidecar_digest(contents: &[u8]) -> &str {
    core::str::from_utf8(contents)
        .ok()
        .and_then(|text| text.split_whitespace().next())
        .unwrap_or("")
}

pub fn checksum_matches(sidecar: &[u8], actual_hex: &str) -> bool {
    let expected = sidecar_digest(sidecar);
    !expected.is_empty() && expected.eq_ignore_ascii_case(actual_hex)
}
