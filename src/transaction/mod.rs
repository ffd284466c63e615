//! Transactions over staged record files.
//!
//! A transaction is a batch of pending writes and deletes. Writes arrive
//! already staged as files in the store root; commit renames them into their
//! type directory and then removes deleted records. Abort removes the staging
//! files and leaves the record files untouched.
//!
//! Commit is best effort per resource. A failed rename or delete is reported
//! in the returned [`CommitReport`](crate::CommitReport) and the rest of the
//! batch still runs.

mod resource;
#[allow(clippy::module_inception)]
mod transaction;

pub use resource::Resource;
pub use transaction::{Transaction, TransactionState};
