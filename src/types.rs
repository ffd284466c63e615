//! Core types for the file store.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Digits used for id encoding, lowercase base 36.
const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Identifier of a record within its type.
///
/// Generated ids are lowercase base-36 strings, but callers may supply any
/// name that is a valid file name (see [`validate_name`]).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    /// Encode a numeric counter value as a base-36 id.
    pub fn from_counter(mut value: u64) -> Self {
        if value == 0 {
            return RecordId("0".to_string());
        }

        let mut digits = Vec::with_capacity(13);
        while value > 0 {
            digits.push(BASE36_DIGITS[(value % 36) as usize]);
            value /= 36;
        }
        digits.reverse();

        // Only ASCII digits were pushed.
        RecordId(digits.into_iter().map(char::from).collect())
    }

    /// Decode a base-36 id back into its counter value, if it is one.
    pub fn to_counter(&self) -> Option<u64> {
        u64::from_str_radix(&self.0, 36)
            .ok()
            .filter(|_| {
                self.0
                    .bytes()
                    .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
            })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId(s)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check that `name` can be used as a type directory or record file name.
///
/// Names must be a single non-empty path component that does not start with
/// a dot. Dot-prefixed names in the root are reserved for staging files and
/// the lock file.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidArgument(format!("{} must not be empty", kind)));
    }
    if name.starts_with('.') {
        return Err(StoreError::InvalidArgument(format!(
            "{} must not start with '.': {:?}",
            kind, name
        )));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(StoreError::InvalidArgument(format!(
            "{} must be a single path component: {:?}",
            kind, name
        )));
    }
    Ok(())
}

/// What went wrong while applying one resource during commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitIssueKind {
    /// The staged content could not be renamed onto the target. The staging
    /// file is left on disk.
    RenameFailed,
    /// The record file could not be deleted. The record stays visible.
    DeleteFailed,
}

/// A resource that commit could not apply.
#[derive(Clone, Debug)]
pub struct CommitIssue {
    pub kind: CommitIssueKind,
    /// Final record path.
    pub target: PathBuf,
    /// Staging file left behind, for failed writes.
    pub staging: Option<PathBuf>,
    /// Rendered OS error.
    pub error: String,
}

/// Outcome of a commit.
///
/// Commit is best effort per resource: a failed rename or delete does not
/// stop the rest of the batch, it is listed in `issues` instead.
#[derive(Clone, Debug, Default)]
pub struct CommitReport {
    /// Writes renamed into place.
    pub writes_applied: usize,
    /// Deletes processed, including deletes of records that did not exist.
    pub deletes_applied: usize,
    pub issues: Vec<CommitIssue>,
}

impl CommitReport {
    /// True when every resource was applied.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}
