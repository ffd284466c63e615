//! Bundled serde codecs.

use super::Persister;
use crate::error::{Result, StoreError};
use crate::types::RecordId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::io::{Read, Write};
use std::marker::PhantomData;

/// Stores records as JSON documents.
pub struct JsonPersister<T> {
    pretty: bool,
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonPersister<T> {
    /// Compact JSON, one line per record file.
    pub fn new() -> Self {
        Self {
            pretty: false,
            _record: PhantomData,
        }
    }

    /// Indented JSON, easier to inspect by hand.
    pub fn pretty() -> Self {
        Self {
            pretty: true,
            _record: PhantomData,
        }
    }
}

impl<T> Default for JsonPersister<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonPersister<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonPersister")
            .field("pretty", &self.pretty)
            .finish()
    }
}

impl<T> Persister for JsonPersister<T>
where
    T: Serialize + DeserializeOwned,
{
    type Record = T;

    fn store(&self, record: &T, mut out: &mut dyn Write) -> Result<()> {
        let written = if self.pretty {
            serde_json::to_writer_pretty(&mut out, record)
        } else {
            serde_json::to_writer(&mut out, record)
        };

        written.map_err(|e| {
            if e.is_io() {
                StoreError::Io(e.into())
            } else {
                StoreError::NotEncodable(e.to_string())
            }
        })
    }

    fn retrieve(&self, record_type: &str, id: &RecordId, input: &mut dyn Read) -> Result<T> {
        serde_json::from_reader(input).map_err(|e| {
            if e.is_io() {
                StoreError::Io(e.into())
            } else {
                StoreError::not_decodable(record_type, id.as_str(), e)
            }
        })
    }
}

/// Stores records as MessagePack maps with named fields.
pub struct MsgPackPersister<T> {
    _record: PhantomData<fn() -> T>,
}

impl<T> MsgPackPersister<T> {
    pub fn new() -> Self {
        Self {
            _record: PhantomData,
        }
    }
}

impl<T> Default for MsgPackPersister<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for MsgPackPersister<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MsgPackPersister")
    }
}

impl<T> Persister for MsgPackPersister<T>
where
    T: Serialize + DeserializeOwned,
{
    type Record = T;

    fn store(&self, record: &T, mut out: &mut dyn Write) -> Result<()> {
        rmp_serde::encode::write_named(&mut out, record)
            .map_err(|e| StoreError::NotEncodable(e.to_string()))
    }

    fn retrieve(&self, record_type: &str, id: &RecordId, input: &mut dyn Read) -> Result<T> {
        rmp_serde::from_read(input)
            .map_err(|e| StoreError::not_decodable(record_type, id.as_str(), e))
    }
}
