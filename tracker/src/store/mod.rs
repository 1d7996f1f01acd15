//! Durable keyed storage for post records.
//!
//! The persistence medium is opaque to the tracking engine: anything that
//! can load a full record by id and replace it atomically qualifies. The
//! store handle is passed explicitly wherever persistence happens, so
//! tests and embedders can swap the flat-file store for an in-memory one.

pub mod file;
pub mod memory;

use std::sync::Arc;

use thiserror::Error;

use crate::post::PostRecord;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Error raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Post id contains characters the backend cannot key by.
    #[error("post id {0:?} is not storable")]
    InvalidId(String),

    /// Underlying medium failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded, or a stored one could not be
    /// decoded. Corruption is reported as an error, never as a partial
    /// record.
    #[error("record serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Keyed post-record storage with all-or-nothing calls.
pub trait Store: Send + Sync {
    /// Load the record for `id`, or `None` when absent.
    fn get(&self, id: &str) -> Result<Option<PostRecord>, StoreError>;

    /// Persist `record` under its id.
    ///
    /// With `overwrite` false, an existing record is left untouched and
    /// the call reports `Ok(false)`. With `overwrite` true the prior
    /// content is replaced atomically, so readers see either the old
    /// record or the new one, never a mixture. A successful call is
    /// durable before it returns.
    fn create(&self, record: &PostRecord, overwrite: bool) -> Result<bool, StoreError>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn get(&self, id: &str) -> Result<Option<PostRecord>, StoreError> {
        (**self).get(id)
    }

    fn create(&self, record: &PostRecord, overwrite: bool) -> Result<bool, StoreError> {
        (**self).create(record, overwrite)
    }
}
