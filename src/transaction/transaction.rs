//! Transaction state machine and commit/abort application.

use super::Resource;
use crate::error::{Result, StoreError};
use crate::types::{CommitIssue, CommitIssueKind, CommitReport};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Lifecycle of a transaction. `Committed` and `Aborted` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    Aborted,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Open => "open",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// An ordered batch of pending writes and deletes.
///
/// Obtained from [`Store::begin_transaction`](crate::Store::begin_transaction)
/// and owned by the caller. A transaction is single use: once committed or
/// aborted, every further call fails with [`StoreError::TransactionClosed`].
///
/// Dropping a transaction that is still open with pending resources aborts
/// it and logs a warning.
#[must_use = "a transaction must be committed or aborted"]
#[derive(Debug)]
pub struct Transaction {
    pending_writes: Vec<Resource>,
    pending_deletes: Vec<Resource>,
    state: TransactionState,
}

impl Transaction {
    /// Create an empty, open transaction.
    pub fn new() -> Self {
        Self {
            pending_writes: Vec::new(),
            pending_deletes: Vec::new(),
            state: TransactionState::Open,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == TransactionState::Open
    }

    /// Number of pending resources.
    pub fn len(&self) -> usize {
        self.pending_writes.len() + self.pending_deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_writes.is_empty() && self.pending_deletes.is_empty()
    }

    /// Pending writes in registration order.
    pub fn pending_writes(&self) -> &[Resource] {
        &self.pending_writes
    }

    /// Pending deletes in registration order.
    pub fn pending_deletes(&self) -> &[Resource] {
        &self.pending_deletes
    }

    /// Fail unless the transaction still accepts resources.
    pub fn ensure_open(&self) -> Result<()> {
        match self.state {
            TransactionState::Open => Ok(()),
            closed => Err(StoreError::TransactionClosed(closed)),
        }
    }

    /// Register a pending resource.
    ///
    /// No validation happens here; the store has already staged the content.
    pub fn add_resource(&mut self, resource: Resource) -> Result<()> {
        self.ensure_open()?;

        if resource.is_write() {
            self.pending_writes.push(resource);
        } else {
            self.pending_deletes.push(resource);
        }
        Ok(())
    }

    /// Apply every pending resource: all writes first, then all deletes,
    /// each in registration order.
    ///
    /// Individual rename or delete failures do not fail the commit. They are
    /// listed in the report, and the affected staging file or record file is
    /// left where it is.
    pub fn commit(&mut self) -> Result<CommitReport> {
        self.ensure_open()?;

        let mut report = CommitReport::default();

        for resource in self.pending_writes.drain(..) {
            let Resource::Write { staging, target } = resource else {
                continue;
            };

            match apply_write(&staging, &target) {
                Ok(()) => report.writes_applied += 1,
                Err(e) => {
                    warn!(
                        staging = %staging.display(),
                        record = %target.display(),
                        error = %e,
                        "failed to rename staged record into place"
                    );
                    report.issues.push(CommitIssue {
                        kind: CommitIssueKind::RenameFailed,
                        target,
                        staging: Some(staging),
                        error: e.to_string(),
                    });
                }
            }
        }

        for resource in self.pending_deletes.drain(..) {
            let target = resource.target();

            match fs::remove_file(target) {
                Ok(()) => report.deletes_applied += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => report.deletes_applied += 1,
                Err(e) => {
                    warn!(record = %target.display(), error = %e, "failed to delete record");
                    report.issues.push(CommitIssue {
                        kind: CommitIssueKind::DeleteFailed,
                        target: target.to_path_buf(),
                        staging: None,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.state = TransactionState::Committed;

        debug!(
            writes = report.writes_applied,
            deletes = report.deletes_applied,
            issues = report.issues.len(),
            "transaction committed"
        );

        Ok(report)
    }

    /// Discard every staged write. Pending deletes are dropped; nothing was
    /// staged for them.
    pub fn abort(&mut self) -> Result<()> {
        self.ensure_open()?;
        let discarded = self.discard();
        self.state = TransactionState::Aborted;

        debug!(discarded, "transaction aborted");
        Ok(())
    }

    /// Remove staging files and clear both lists. Returns the number of
    /// writes discarded.
    fn discard(&mut self) -> usize {
        let discarded = self.pending_writes.len();

        for resource in self.pending_writes.drain(..) {
            if let Some(staging) = resource.staging() {
                if let Err(e) = fs::remove_file(staging) {
                    debug!(staging = %staging.display(), error = %e, "could not remove staging file");
                }
            }
        }
        self.pending_deletes.clear();

        discarded
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.is_open() && !self.is_empty() {
            warn!(
                writes = self.pending_writes.len(),
                deletes = self.pending_deletes.len(),
                "open transaction dropped; discarding staged writes"
            );
            self.discard();
            self.state = TransactionState::Aborted;
        }
    }
}

/// Move staged content onto its target path.
fn apply_write(staging: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(staging, target) {
        Ok(()) => Ok(()),
        // Some platforms refuse to rename onto an existing file.
        Err(e) if target.is_file() && staging.is_file() => {
            debug!(record = %target.display(), error = %e, "replacing existing record before rename");
            fs::remove_file(target)?;
            fs::rename(staging, target)
        }
        Err(e) => Err(e),
    }
}
