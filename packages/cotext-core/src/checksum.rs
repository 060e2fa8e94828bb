use ropey::Rope;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const CHECKSUM_DOMAIN: &[u8] = b"cotext/checksum/v0";

/// Cheap fingerprint of a document used by the consistency watchdog.
///
/// Two documents with equal content always have equal checksums; the converse holds only
/// with overwhelming probability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DocumentChecksum {
    /// Length in chars.
    pub length: usize,
    pub hash: u64,
}

impl DocumentChecksum {
    pub fn of_str(content: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(CHECKSUM_DOMAIN);
        hasher.update(content.as_bytes());
        Self::finish(content.chars().count(), hasher)
    }

    pub fn of_rope(rope: &Rope) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(CHECKSUM_DOMAIN);
        for chunk in rope.chunks() {
            hasher.update(chunk.as_bytes());
        }
        Self::finish(rope.len_chars(), hasher)
    }

    fn finish(length: usize, hasher: blake3::Hasher) -> Self {
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        Self {
            length,
            hash: u64::from_be_bytes(head),
        }
    }
}
