//! Per-type record id allocation.
//!
//! Ids are a base-36 allocation sequence per type, starting at `1`. The
//! cached counter is only a starting point: each candidate is checked against
//! the type directory and skipped if a file with that name already exists, so
//! records created before a restart or by another writer are never
//! overwritten by a fresh insert.

use crate::error::Result;
use crate::types::RecordId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// First counter value handed out for a type.
const FIRST_ID: u64 = 1;

/// Allocates unique ids for every type of one store.
#[derive(Debug, Default)]
pub struct IdGenerator {
    /// Next candidate per type. Not persisted.
    next: Mutex<HashMap<String, u64>>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next free id for `record_type`, whose records live in
    /// `type_dir`.
    ///
    /// Allocation for all types is serialized on a single lock. An id is
    /// consumed even if the caller never commits a record under it. Fails if
    /// a candidate cannot be checked; the counter is left untouched then.
    pub fn allocate(&self, record_type: &str, type_dir: &Path) -> Result<RecordId> {
        let mut next = self.next.lock();
        let counter = next.entry(record_type.to_string()).or_insert(FIRST_ID);

        let mut candidate = *counter;
        let mut skipped = 0u64;
        let id = loop {
            let id = RecordId::from_counter(candidate);
            if is_free(&type_dir.join(id.as_str()))? {
                break id;
            }
            candidate += 1;
            skipped += 1;
        };
        *counter = candidate + 1;

        if skipped > 0 {
            debug!(record_type, id = %id, skipped, "skipped existing ids during allocation");
        }

        Ok(id)
    }

    /// Next candidate cached for `record_type`, if the type has been seen.
    pub fn peek(&self, record_type: &str) -> Option<u64> {
        self.next.lock().get(record_type).copied()
    }
}

/// A name is free only when nothing at all is there, dangling symlinks
/// included.
fn is_free(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e.into()),
    }
}
