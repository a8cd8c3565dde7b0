use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::clock::TimestampGenerator;
use crate::error::Result;
use crate::filename::{self, FileKind};
use crate::iterator::{
    self, CellIter, CollapseEquals, Direction, DropTombstones, MergeIterator, Table,
};
use crate::memtable::{MemTable, MemTableIter};
use crate::sstable::SSTable;
use crate::types::{Cell, Record, Value};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// Directory holding the table files.
    pub dir: PathBuf,
    /// Flush the memtable once its footprint exceeds this many bytes.
    /// 0 flushes on every write.
    pub flush_threshold: u64,
    /// Records between two sparse index entries in a table.
    pub index_interval: usize,
}

impl Options {
    pub const DEFAULT_FLUSH_THRESHOLD: u64 = 4 * 1024 * 1024;
    pub const DEFAULT_INDEX_INTERVAL: usize = 16;

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Options {
            dir: dir.into(),
            flush_threshold: Self::DEFAULT_FLUSH_THRESHOLD,
            index_interval: Self::DEFAULT_INDEX_INTERVAL,
        }
    }

    pub fn flush_threshold(mut self, bytes: u64) -> Self {
        self.flush_threshold = bytes;
        self
    }

    pub fn index_interval(mut self, records: usize) -> Self {
        self.index_interval = records.max(1);
        self
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub memtable_bytes: u64,
    pub memtable_entries: usize,
    pub sstables: usize,
    pub sstable_bytes: u64,
    pub next_generation: u64,
}

/// Everything a flush or compaction swaps. Guarded by one lock so readers
/// never see a half-swapped memtable or table set.
pub(crate) struct State {
    /// Shared with open iterators; writers go through `Arc::make_mut`, so
    /// a snapshot held by a reader is never mutated.
    pub(crate) memtable: Arc<MemTable>,
    /// Keyed by generation, so iteration is oldest first.
    pub(crate) sstables: BTreeMap<u64, SSTable>,
    /// Always greater than every generation in `sstables`.
    pub(crate) next_generation: u64,
}

/// An LSM key-value store over one directory.
///
/// Writes go to the memtable and are flushed to a new SSTable once the
/// memtable crosses `flush_threshold`. Reads merge the memtable with every
/// SSTable. `compact` folds all SSTables into one.
///
/// `DB` is `Send + Sync`: share it behind an `Arc`. Writes, flushes and
/// compaction are serialized; iterators run concurrently with all of them
/// over the snapshot taken when they were created.
pub struct DB {
    options: Options,
    clock: Arc<TimestampGenerator>,
    state: RwLock<State>,
}

impl DB {
    /// Open the store in `options.dir`, creating the directory if needed.
    ///
    /// Every `<generation>.sst` directly inside the directory is opened and
    /// validated; a corrupt table fails the whole open. Leftover `.tmp`
    /// files from an interrupted flush or compaction are removed.
    pub fn open(options: Options) -> Result<Self> {
        fs::create_dir_all(&options.dir)?;

        let mut tables = BTreeMap::new();
        for entry in fs::read_dir(&options.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            match filename::parse(&path) {
                Some(FileKind::Table(generation)) => {
                    tables.insert(generation, SSTable::open(&path)?);
                }
                Some(FileKind::Temp(_)) => {
                    warn!(path = %path.display(), "removing unpublished table");
                    fs::remove_file(&path)?;
                }
                None => {}
            }
        }

        Ok(Self::from_tables(options, tables))
    }

    /// Resume from tables that are already open, keyed by generation.
    pub fn from_tables(options: Options, tables: BTreeMap<u64, SSTable>) -> Self {
        let clock = Arc::new(TimestampGenerator::new());
        if let Some(max_ts) = tables.values().map(|t| t.meta().max_timestamp).max() {
            clock.observe(max_ts);
        }
        let next_generation = tables
            .keys()
            .next_back()
            .map_or(1, |&newest| newest + 1)
            .max(1);

        info!(
            dir = %options.dir.display(),
            sstables = tables.len(),
            next_generation,
            "opened store"
        );

        DB {
            state: RwLock::new(State {
                memtable: Arc::new(MemTable::new(Arc::clone(&clock))),
                sstables: tables,
                next_generation,
            }),
            clock,
            options,
        }
    }

    /// Insert or overwrite `key`. May flush synchronously.
    pub fn upsert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut state = self.state.write();
        Arc::make_mut(&mut state.memtable).upsert(key.to_vec(), value.to_vec());
        self.maybe_flush(&mut state)
    }

    /// Delete `key` by writing a tombstone. May flush synchronously.
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        let mut state = self.state.write();
        Arc::make_mut(&mut state.memtable).remove(key.to_vec());
        self.maybe_flush(&mut state)
    }

    /// Latest live value of `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let state = self.state.read();

        // The memtable always holds the newest version when it has one.
        let newest = match state.memtable.get(key) {
            Some(value) => Some(value.clone()),
            None => {
                let mut newest: Option<Value> = None;
                for table in state.sstables.values() {
                    if let Some(value) = table.get(key)? {
                        if newest.as_ref().is_none_or(|n| value.timestamp() > n.timestamp()) {
                            newest = Some(value);
                        }
                    }
                }
                newest
            }
        };

        newest
            .filter(|value| !value.is_tombstone())
            .map(Value::into_bytes)
            .transpose()
    }

    /// Live records with key >= `from`, ascending.
    pub fn iter(&self, from: &[u8]) -> Result<DbIterator> {
        self.scan(from, Direction::Forward)
    }

    /// Live records with key <= `from`, descending.
    pub fn iter_rev(&self, from: &[u8]) -> Result<DbIterator> {
        self.scan(from, Direction::Reverse)
    }

    /// Flush whatever the memtable holds so no acknowledged write is lost.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write();
        if !state.memtable.is_empty() {
            self.flush(&mut state)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> Stats {
        let state = self.state.read();
        Stats {
            memtable_bytes: state.memtable.size_bytes(),
            memtable_entries: state.memtable.len(),
            sstables: state.sstables.len(),
            sstable_bytes: state.sstables.values().map(|t| t.meta().file_size).sum(),
            next_generation: state.next_generation,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.options.dir
    }

    fn scan(&self, from: &[u8], direction: Direction) -> Result<DbIterator> {
        let state = self.state.read();

        // Both kinds of source pin what they read: the memtable snapshot
        // through its Arc, table files through theirs.
        let memtable = MemTableIter::new(Arc::clone(&state.memtable), from, direction);

        let mut sources: Vec<CellIter<'static>> = Vec::with_capacity(state.sstables.len() + 1);
        sources.push(Box::new(memtable.map(Ok)));
        for table in state.sstables.values() {
            let iter: CellIter<'static> = match direction {
                Direction::Forward => Box::new(table.iter_from(from)?),
                Direction::Reverse => Box::new(table.iter_rev_from(from)?),
            };
            sources.push(iter);
        }
        drop(state);

        Ok(DbIterator {
            inner: DropTombstones::new(iterator::merged(sources, direction)?),
        })
    }

    fn maybe_flush(&self, state: &mut State) -> Result<()> {
        if state.memtable.size_bytes() > self.options.flush_threshold {
            self.flush(state)?;
        }
        Ok(())
    }

    /// Persist the memtable as the next generation and start a fresh one.
    /// On error nothing is swapped: the memtable and table set are as before.
    fn flush(&self, state: &mut State) -> Result<()> {
        let generation = state.next_generation;
        let entries = state.memtable.len();
        let table = self.write_table(generation, state.memtable.scan(&[], Direction::Forward)?)?;

        info!(
            generation,
            entries,
            bytes = table.meta().file_size,
            "flushed memtable"
        );

        state.sstables.insert(generation, table);
        state.next_generation += 1;
        state.memtable = Arc::new(MemTable::new(Arc::clone(&self.clock)));
        Ok(())
    }

    /// Write `cells` under the temp name for `generation`, validate it and
    /// publish it under the table name.
    ///
    /// Every failure happens before the rename, so an error leaves the
    /// published table of `generation` (if any) untouched.
    pub(crate) fn write_table<I>(&self, generation: u64, cells: I) -> Result<SSTable>
    where
        I: IntoIterator<Item = Result<Cell>>,
    {
        let tmp = filename::temp_path(&self.options.dir, generation);
        let dest = filename::table_path(&self.options.dir, generation);

        let written = SSTable::write(cells, &tmp, self.options.index_interval)
            .and_then(|_| SSTable::open_as(&tmp, &dest))
            .and_then(|table| filename::publish(&tmp, &dest).map(|()| table));
        if written.is_err() {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(path = %tmp.display(), error = %cleanup, "failed to remove temp table");
                }
            }
        }
        written
    }

    pub(crate) fn state(&self) -> &RwLock<State> {
        &self.state
    }
}

/// Lazy ascending (or descending) stream of live records.
///
/// Holds its own snapshot: writes, flushes and compactions that happen
/// after it was created are not visible through it.
pub struct DbIterator {
    inner: DropTombstones<CollapseEquals<MergeIterator<'static>>>,
}

impl Iterator for DbIterator {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.inner.next()?.and_then(Record::try_from))
    }
}
