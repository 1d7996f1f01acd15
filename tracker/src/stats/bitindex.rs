//! Bit-packed open-state storage keyed by recipient index.
//!
//! Recipient lists run into the thousands, so per-recipient open flags are
//! packed eight to a byte and the persisted blob stays small. Membership
//! tests are O(1).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use thiserror::Error;

/// Error returned when a persisted bit blob cannot be decoded.
#[derive(Debug, Error)]
pub enum BitIndexError {
    /// The stored string is not valid base64.
    #[error("open-state blob is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Growable set of recipient indices stored as packed bits.
///
/// Bit `i` is set iff recipient `i` opened the email. The backing storage
/// grows on demand and never shrinks; reads beyond the current capacity
/// report unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitIndex {
    words: Vec<u8>,
}

impl BitIndex {
    /// Create an empty index with no bits set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether bit `i` is set. Indices beyond capacity read as unset.
    pub fn get(&self, i: usize) -> bool {
        match self.words.get(i / 8) {
            Some(word) => word & (1 << (i % 8)) != 0,
            None => false,
        }
    }

    /// Set or clear bit `i`, growing the backing storage as needed.
    ///
    /// Clearing a bit beyond the current capacity is a complete no-op and
    /// does not grow anything; setting an already-set bit is idempotent.
    pub fn set(&mut self, i: usize, value: bool) {
        let word = i / 8;
        if word >= self.words.len() {
            if !value {
                return;
            }
            self.words.resize(word + 1, 0);
        }
        if value {
            self.words[word] |= 1 << (i % 8);
        } else {
            self.words[word] &= !(1 << (i % 8));
        }
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> u64 {
        self.words.iter().map(|w| u64::from(w.count_ones())).sum()
    }

    /// Serialize to the canonical persisted form.
    ///
    /// Trailing zero bytes are trimmed before encoding so equal bit sets
    /// always serialize identically; an empty index serializes to `""`.
    pub fn serialize(&self) -> String {
        match self.words.iter().rposition(|w| *w != 0) {
            Some(last) => BASE64.encode(&self.words[..=last]),
            None => String::new(),
        }
    }

    /// Rebuild an index from its serialized form.
    ///
    /// An empty string yields the empty index.
    pub fn deserialize(encoded: &str) -> Result<Self, BitIndexError> {
        if encoded.is_empty() {
            return Ok(Self::new());
        }
        let words = BASE64.decode(encoded)?;
        Ok(Self { words })
    }
}
