use std::fmt;

use serde::{Deserialize, Serialize};

/// Lowercase hex SHA-256 of an archive's bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    pub const HEX_LEN: usize = 64;

    /// Builds a digest from raw hash output.
    pub fn from_hash_output(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Parses the first token of a checksum record.
    ///
    /// Accepts the bare `<hex>` form written by the store as well as the
    /// `<hex>  <file>` layout produced by `sha256sum`. Returns `None` for
    /// anything that is not a full-length hex digest.
    pub fn parse(record: &str) -> Option<Self> {
        let token = record.split_whitespace().next()?;
        if token.len() != Self::HEX_LEN || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(token.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Single-line record content as persisted on disk.
    #[must_use]
    pub fn to_record(&self) -> String {
        format!("{}\n", self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[test]
    fn parses_bare_and_sha256sum_records() {
        let bare = Digest::parse(&format!("{SAMPLE}\n")).expect("bare record");
        let tool = Digest::parse(&format!("{SAMPLE}  base.tar\n")).expect("sha256sum record");
        assert_eq!(bare, tool);
        assert_eq!(bare.to_record(), format!("{SAMPLE}\n"));
    }

    #[test]
    fn normalizes_uppercase_hex() {
        let digest = Digest::parse(&SAMPLE.to_ascii_uppercase()).expect("uppercase digest");
        assert_eq!(digest.as_str(), SAMPLE);
    }

    #[test]
    fn rejects_truncated_or_garbage_records() {
        assert!(Digest::parse("").is_none());
        assert!(Digest::parse(&SAMPLE[..32]).is_none());
        assert!(Digest::parse(&SAMPLE.replace('a', "z")).is_none());
    }

    #[test]
    fn serializes_as_plain_string() {
        let digest = Digest::parse(SAMPLE).expect("digest");
        let json = serde_json::to_string(&digest).expect("serialize");
        assert_eq!(json, format!("\"{SAMPLE}\""));
    }
}
