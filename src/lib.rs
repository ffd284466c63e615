//! # File Store
//!
//! An embedded object store that keeps every record as a plain file.
//!
//! ## Core Concepts
//!
//! - **Records**: Opaque payloads identified by `(type, id)`, stored at
//!   `root/<type>/<id>`
//! - **Persisters**: Application-supplied serializers; the store only moves
//!   bytes and files
//! - **Transactions**: Batches of staged writes and deletes, applied by
//!   rename on commit or discarded on abort
//! - **Ids**: Per-type base-36 sequence, checked against the disk so existing
//!   files are never overwritten
//!
//! ## Example
//!
//! ```no_run
//! use filestore::{JsonPersister, Store, StoreConfig};
//! use serde_json::json;
//!
//! # fn main() -> filestore::Result<()> {
//! let store = Store::open(StoreConfig::at("./my-store"), JsonPersister::new())?;
//!
//! let mut txn = store.begin_transaction();
//! let id = store.insert(&mut txn, "user", &json!({"name": "a"}))?;
//! store.commit_transaction(&mut txn)?;
//!
//! assert_eq!(store.get("user", &id)?, Some(json!({"name": "a"})));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod ids;
pub mod persist;
pub mod store;
pub mod transaction;
pub mod types;

// Re-exports
pub use error::{Result, StoreError};
pub use ids::IdGenerator;
pub use persist::{JsonPersister, MsgPackPersister, Persister};
pub use store::{Store, StoreConfig, StoreStats};
pub use transaction::{Resource, Transaction, TransactionState};
pub use types::*;
