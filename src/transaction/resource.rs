//! Pending filesystem effects owned by a transaction.

use std::path::{Path, PathBuf};

/// One pending effect of a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    /// Create or replace `target` with the content staged at `staging`.
    Write { staging: PathBuf, target: PathBuf },
    /// Remove `target` if it exists.
    Delete { target: PathBuf },
}

impl Resource {
    /// Final record path this resource applies to.
    pub fn target(&self) -> &Path {
        match self {
            Resource::Write { target, .. } | Resource::Delete { target } => target,
        }
    }

    /// Staging file holding the new content, for writes.
    pub fn staging(&self) -> Option<&Path> {
        match self {
            Resource::Write { staging, .. } => Some(staging),
            Resource::Delete { .. } => None,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Resource::Write { .. })
    }
}
