use std::cmp::Ordering;

use crate::error::{Error, Result};

/// Raw key bytes. Compared lexicographically, never interpreted.
pub type Key = Vec<u8>;

/// A versioned value: either live data or a deletion marker.
///
/// A tombstone is not the same as absence. Older versions of the key may
/// still live in SSTables on disk, and the tombstone is what hides them
/// during merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A live value written at logical time `timestamp`.
    Data { timestamp: u64, bytes: Vec<u8> },
    /// A delete written at logical time `timestamp`.
    Tombstone { timestamp: u64 },
}

impl Value {
    pub fn data(timestamp: u64, bytes: Vec<u8>) -> Self {
        Value::Data { timestamp, bytes }
    }

    pub fn tombstone(timestamp: u64) -> Self {
        Value::Tombstone { timestamp }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Value::Data { timestamp, .. } | Value::Tombstone { timestamp } => *timestamp,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Value::Tombstone { .. })
    }

    /// Payload of a live value. Tombstones have none.
    pub fn bytes(&self) -> Result<&[u8]> {
        match self {
            Value::Data { bytes, .. } => Ok(bytes),
            Value::Tombstone { .. } => Err(Error::InvalidState(
                "tombstone has no payload".into(),
            )),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Value::Data { bytes, .. } => Ok(bytes),
            Value::Tombstone { .. } => Err(Error::InvalidState(
                "tombstone has no payload".into(),
            )),
        }
    }

    /// Bytes this value contributes to a memtable footprint.
    pub fn payload_len(&self) -> usize {
        match self {
            Value::Data { bytes, .. } => bytes.len(),
            Value::Tombstone { .. } => 0,
        }
    }

    /// Conflict-resolution order: the more recent value sorts first.
    pub fn cmp_recency(&self, other: &Value) -> Ordering {
        other.timestamp().cmp(&self.timestamp())
    }
}

/// A key paired with a versioned value.
///
/// Cells are what the memtable and SSTables store and what every internal
/// iterator yields. Ordering: key ascending, then most recent first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub key: Key,
    pub value: Value,
}

impl Cell {
    pub fn new(key: Key, value: Value) -> Self {
        Cell { key, value }
    }

    pub fn cmp_ascending(&self, other: &Cell) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.value.cmp_recency(&other.value))
    }
}

/// A live key/value pair as handed out to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Key,
    pub value: Vec<u8>,
}

impl TryFrom<Cell> for Record {
    type Error = Error;

    fn try_from(cell: Cell) -> Result<Self> {
        Ok(Record {
            value: cell.value.into_bytes()?,
            key: cell.key,
        })
    }
}
