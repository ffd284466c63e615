//! Record serialization.
//!
//! The store never looks inside a record. It hands the persister a writer
//! positioned at the start of a staging file and a reader over a committed
//! record file, and treats whatever comes back as opaque.
//!
//! Two codecs are bundled for `serde` types: [`JsonPersister`] keeps records
//! human readable, [`MsgPackPersister`] keeps them compact.

mod codecs;

pub use codecs::{JsonPersister, MsgPackPersister};

use crate::error::Result;
use crate::types::RecordId;
use std::io::{Read, Write};

/// Serializer capability supplied by the embedding application.
pub trait Persister: Send + Sync {
    /// Record type handled by this persister.
    type Record;

    /// Serialize `record` into `out`.
    ///
    /// Should fail with [`StoreError::NotEncodable`](crate::StoreError::NotEncodable)
    /// when the record cannot be represented. A partial write is cleaned up
    /// by the store.
    fn store(&self, record: &Self::Record, out: &mut dyn Write) -> Result<()>;

    /// Deserialize the record stored as `record_type/id`.
    ///
    /// Should fail with [`StoreError::NotDecodable`](crate::StoreError::NotDecodable)
    /// on malformed content.
    fn retrieve(&self, record_type: &str, id: &RecordId, input: &mut dyn Read)
        -> Result<Self::Record>;
}
