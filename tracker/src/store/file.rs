//! Flat-file store: one JSON document per post.
//!
//! Records land under a single data directory as `<id>.json`. Writes go to
//! a temp file in the same directory first and reach their final name via
//! `rename` (overwrite) or `hard_link` (create-without-overwrite), both of
//! which are atomic on POSIX filesystems.

use std::fs;
use std::io;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::post::PostRecord;

use super::{Store, StoreError};

/// Store keeping each post record as `<id>.json` under a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Resolve the file path for a post id.
    ///
    /// Ids become file names, so anything outside a conservative alphabet
    /// is rejected before it can traverse the filesystem.
    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        let storable = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !storable {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    /// Write the record to a synced temp file in the data directory.
    fn write_temp(&self, record: &PostRecord) -> Result<NamedTempFile, StoreError> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut tmp, record)?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }

    /// Flush directory metadata so a completed write survives power loss.
    fn sync_dir(&self) -> Result<(), StoreError> {
        fs::File::open(&self.dir)?.sync_all()?;
        Ok(())
    }
}

impl Store for FileStore {
    fn get(&self, id: &str) -> Result<Option<PostRecord>, StoreError> {
        let path = self.path_for(id)?;

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn create(&self, record: &PostRecord, overwrite: bool) -> Result<bool, StoreError> {
        let path = self.path_for(&record.id)?;
        let tmp = self.write_temp(record)?;

        if overwrite {
            tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        } else {
            // hard_link fails with AlreadyExists when the id is taken,
            // which keeps create-without-overwrite atomic as well. The
            // temp file unlinks itself on drop.
            match fs::hard_link(tmp.path(), &path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(post_id = %record.id, "post_store_duplicate_id");
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.sync_dir()?;

        debug!(
            post_id = %record.id,
            overwrite = overwrite,
            "post_store_written"
        );
        Ok(true)
    }
}
