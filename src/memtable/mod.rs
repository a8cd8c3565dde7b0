pub mod skiplist;

use std::sync::Arc;

use skiplist::SkipList;

use crate::clock::TimestampGenerator;
use crate::error::Result;
use crate::iterator::{CellIter, Direction, Table};
use crate::types::{Cell, Value};

/// In-memory sorted buffer for writes. Wraps a SkipList.
///
/// Every write goes here first. When the engine sees the footprint cross
/// its flush threshold, the memtable is written out as an SSTable and
/// replaced by an empty one.
///
/// Deletes are handled via tombstones. You can't just remove the key
/// because older versions may exist in SSTables on disk.
///
/// Cloning copies every entry. The engine keeps the memtable behind an
/// `Arc` and clones only when a write finds a reader still holding it.
#[derive(Clone)]
pub struct MemTable {
    data: SkipList<Value>,
    /// Sum of `key.len() + payload.len()` over all entries (tombstones have
    /// no payload). Maintained incrementally on every mutation.
    size_bytes: u64,
    clock: Arc<TimestampGenerator>,
}

impl MemTable {
    /// Create an empty memtable that stamps writes with `clock`.
    pub fn new(clock: Arc<TimestampGenerator>) -> Self {
        MemTable {
            data: SkipList::new(),
            size_bytes: 0,
            clock,
        }
    }

    /// Insert or overwrite a live value.
    pub fn upsert(&mut self, key: Vec<u8>, value: Vec<u8>) {
        let key_len = key.len() as u64;
        let new_len = value.len() as u64;
        let timestamp = self.clock.next();

        match self.data.insert(key, Value::data(timestamp, value)) {
            None => self.size_bytes += key_len + new_len,
            Some(previous) => {
                self.size_bytes = self.size_bytes - previous.payload_len() as u64 + new_len;
            }
        }
    }

    /// Mark a key as deleted by writing a tombstone.
    pub fn remove(&mut self, key: Vec<u8>) {
        let key_len = key.len() as u64;
        let timestamp = self.clock.next();

        match self.data.insert(key, Value::tombstone(timestamp)) {
            None => self.size_bytes += key_len,
            Some(previous) => self.size_bytes -= previous.payload_len() as u64,
        }
    }

    /// The stored version of `key`, tombstones included.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.data.get(key)
    }

    /// Ascending cells with key >= `from`, tombstones included.
    ///
    /// Tombstones must survive a flush so they keep shadowing older
    /// versions on disk.
    pub fn iter_from<'a>(&'a self, from: &[u8]) -> impl Iterator<Item = Cell> + Send + use<'a> {
        self.data
            .seek(from)
            .map(|(key, value)| Cell::new(key.to_vec(), value.clone()))
    }

    /// Descending cells with key <= `from`, tombstones included.
    pub fn iter_rev_from<'a>(&'a self, from: &[u8]) -> impl Iterator<Item = Cell> + Send + use<'a> {
        self.data
            .seek_for_prev(from)
            .map(|(key, value)| Cell::new(key.to_vec(), value.clone()))
    }

    /// Current footprint in bytes. O(1).
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Lazy iterator owning a shared memtable snapshot.
///
/// Cells are cloned one at a time as the caller pulls them, so taking
/// the first record of a scan costs one seek, not a copy of the range.
pub struct MemTableIter {
    table: Arc<MemTable>,
    direction: Direction,
    current: Option<usize>,
}

impl MemTableIter {
    /// Cells from `from` (inclusive) in `direction` order, tombstones
    /// included.
    pub fn new(table: Arc<MemTable>, from: &[u8], direction: Direction) -> Self {
        let current = match direction {
            Direction::Forward => table.data.lower_bound(from),
            Direction::Reverse => table.data.upper_bound_inclusive(from),
        };
        MemTableIter {
            table,
            direction,
            current,
        }
    }
}

impl Iterator for MemTableIter {
    type Item = Cell;

    fn next(&mut self) -> Option<Cell> {
        let pos = self.current?;
        let data = &self.table.data;
        self.current = match self.direction {
            Direction::Forward => data.successor(pos),
            Direction::Reverse => data.predecessor(pos),
        };
        let (key, value) = data.entry(pos);
        Some(Cell::new(key.to_vec(), value.clone()))
    }
}

impl Table for MemTable {
    fn scan(&self, from: &[u8], direction: Direction) -> Result<CellIter<'_>> {
        let iter: CellIter<'_> = match direction {
            Direction::Forward => Box::new(self.iter_from(from).map(Ok)),
            Direction::Reverse => Box::new(self.iter_rev_from(from).map(Ok)),
        };
        Ok(iter)
    }
}
