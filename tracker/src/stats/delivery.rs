//! Per-post delivery aggregates.

use serde::{Deserialize, Serialize};

use super::bitindex::{BitIndex, BitIndexError};

/// Aggregate open-tracking state for one post.
///
/// `emails_opened` holds the serialized [`BitIndex`]; only the packed form
/// is ever persisted, and the numeric open count is derived on read. The
/// recipient count is fixed when the record is first saved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStats {
    /// Number of recipients the post was sent to
    pub emails_sent: u64,

    /// Serialized open-state bit index
    #[serde(default)]
    pub emails_opened: String,
}

impl DeliveryStats {
    /// Stats for a fresh send to `emails_sent` recipients, nobody opened yet.
    pub fn new(emails_sent: u64) -> Self {
        Self {
            emails_sent,
            emails_opened: String::new(),
        }
    }

    /// Decode the stored open-state blob.
    pub fn open_bits(&self) -> Result<BitIndex, BitIndexError> {
        BitIndex::deserialize(&self.emails_opened)
    }

    /// Derived open count: the population count of the stored bit index.
    pub fn open_count(&self) -> Result<u64, BitIndexError> {
        Ok(self.open_bits()?.count_ones())
    }
}
