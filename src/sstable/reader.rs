use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::iterator::{CellIter, Direction, Table};
use crate::sstable::builder::SSTableBuilder;
use crate::sstable::footer::{Footer, IndexEntry, SSTableMeta};
use crate::sstable::iterator::{SSTableIterator, SSTableRevIterator};
use crate::sstable::record;
use crate::types::{Cell, Value};

/// An opened SSTable file. Immutable once published.
///
/// On open:
/// 1. Read footer (last 32 bytes) → index offset, entry count, max timestamp
/// 2. Read and parse the sparse index → Vec<IndexEntry>
/// 3. Walk every record once to validate the data section
/// 4. Ready for scans (records read on demand by iterators)
pub struct SSTable {
    file: Arc<TableFile>,
    meta: SSTableMeta,
}

/// The backing file plus everything an iterator needs to read it.
///
/// Shared between the table and all of its live iterators. The file is
/// removed when the last holder drops it, if it was marked obsolete.
pub(crate) struct TableFile {
    pub(crate) path: PathBuf,
    pub(crate) index: Vec<IndexEntry>,
    /// End of the data section, where the index starts.
    pub(crate) data_end: u64,
    obsolete: AtomicBool,
    /// Next newer file retired in the same batch. Held until this file is
    /// unlinked, so retired files leave the disk oldest first.
    newer: Mutex<Option<Arc<TableFile>>>,
}

impl SSTable {
    /// Write `cells` to `path` as a complete SSTable.
    ///
    /// `path` should be a temporary name: this never renames, so a failure
    /// partway leaves at most a partial file under that temporary name.
    pub fn write<I>(cells: I, path: &Path, index_interval: usize) -> Result<SSTableMeta>
    where
        I: IntoIterator<Item = Result<Cell>>,
    {
        let mut builder = SSTableBuilder::new(path, index_interval)?;
        for cell in cells {
            builder.add(&cell?)?;
        }
        builder.finish()
    }

    /// Open and validate an SSTable file.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_as(path, path)
    }

    /// Open and validate the file at `path`, recording it under `published`.
    ///
    /// Lets a table be checked under its temporary name and handed out only
    /// after the rename to `published` succeeded.
    pub(crate) fn open_as(path: &Path, published: &Path) -> Result<Self> {
        let mut file = File::open(path)?;

        let file_size = file.metadata()?.len();
        if file_size < Footer::SIZE as u64 {
            return Err(Error::Corruption(format!(
                "{}: file too short to contain footer",
                path.display()
            )));
        }

        let footer_offset = file_size - Footer::SIZE as u64;
        file.seek(SeekFrom::Start(footer_offset))?;
        let mut footer_buf = vec![0u8; Footer::SIZE];
        file.read_exact(&mut footer_buf)?;
        let footer = Footer::decode(&footer_buf)?;

        if footer.index_offset > footer_offset {
            return Err(Error::Corruption(format!(
                "{}: index offset {} past footer at {}",
                path.display(),
                footer.index_offset,
                footer_offset
            )));
        }

        file.seek(SeekFrom::Start(footer.index_offset))?;
        let mut index_buf = vec![0u8; (footer_offset - footer.index_offset) as usize];
        file.read_exact(&mut index_buf)?;

        let mut index = Vec::new();
        let mut offset = 0usize;
        while offset < index_buf.len() {
            let (entry, consumed) = IndexEntry::decode(&index_buf[offset..])?;
            index.push(entry);
            offset += consumed;
        }

        file.seek(SeekFrom::Start(0))?;
        let data = BufReader::new(file).take(footer.index_offset);
        let meta = Self::validate_data(data, &index, file_size)?;

        if meta.entry_count != footer.entry_count || meta.max_timestamp != footer.max_timestamp {
            return Err(Error::Corruption(format!(
                "{}: footer says {} entries / max ts {}, data has {} / {}",
                path.display(),
                footer.entry_count,
                footer.max_timestamp,
                meta.entry_count,
                meta.max_timestamp
            )));
        }

        debug!(
            path = %path.display(),
            entries = meta.entry_count,
            index_entries = index.len(),
            "opened sstable"
        );

        Ok(SSTable {
            file: Arc::new(TableFile {
                path: published.to_path_buf(),
                index,
                data_end: footer.index_offset,
                obsolete: AtomicBool::new(false),
                newer: Mutex::new(None),
            }),
            meta,
        })
    }

    /// Walk the data section: records must decode, keys must be strictly
    /// increasing and every index entry must sit on a record boundary with
    /// a matching key.
    fn validate_data<R: Read>(
        mut data: R,
        index: &[IndexEntry],
        file_size: u64,
    ) -> Result<SSTableMeta> {
        let mut pending = index.iter().peekable();
        let mut offset = 0u64;
        let mut entry_count = 0u64;
        let mut max_timestamp = 0u64;
        let mut last_key: Option<Vec<u8>> = None;

        while let Some((cell, size)) = record::read_from(&mut data)? {
            if entry_count == 0 && pending.peek().is_none_or(|e| e.offset != 0) {
                return Err(Error::Corruption("first record is not indexed".into()));
            }
            if let Some(entry) = pending.peek() {
                if entry.offset == offset {
                    if entry.key != cell.key {
                        return Err(Error::Corruption(format!(
                            "index key mismatch at offset {offset}"
                        )));
                    }
                    pending.next();
                } else if entry.offset < offset {
                    return Err(Error::Corruption(format!(
                        "index offset {} is not a record boundary",
                        entry.offset
                    )));
                }
            }
            if last_key.as_ref().is_some_and(|last| *last >= cell.key) {
                return Err(Error::Corruption(format!(
                    "keys out of order at offset {offset}"
                )));
            }
            // The clock must still be able to issue a newer timestamp.
            if cell.value.timestamp() == u64::MAX {
                return Err(Error::Corruption(format!(
                    "timestamp u64::MAX at offset {offset}"
                )));
            }

            offset += size as u64;
            entry_count += 1;
            max_timestamp = max_timestamp.max(cell.value.timestamp());
            last_key = Some(cell.key);
        }

        if let Some(entry) = pending.next() {
            return Err(Error::Corruption(format!(
                "index offset {} past end of data",
                entry.offset
            )));
        }

        Ok(SSTableMeta {
            file_size,
            entry_count,
            max_timestamp,
        })
    }

    /// Lazy ascending iterator over cells with key >= `from`.
    ///
    /// Seeks to the last indexed record with key < `from`, so at most one
    /// index interval is scanned before the first hit.
    pub fn iter_from(&self, from: &[u8]) -> Result<SSTableIterator> {
        let index = &self.file.index;
        let i = index.partition_point(|e| e.key.as_slice() < from);
        let start = if i == 0 { 0 } else { index[i - 1].offset };
        SSTableIterator::new(Arc::clone(&self.file), start, from)
    }

    /// Lazy descending iterator over cells with key <= `from`.
    pub fn iter_rev_from(&self, from: &[u8]) -> Result<SSTableRevIterator> {
        let i = self.file.index.partition_point(|e| e.key.as_slice() <= from);
        let first_chunk = i.checked_sub(1);
        SSTableRevIterator::new(Arc::clone(&self.file), first_chunk, from)
    }

    /// Point lookup, tombstones included.
    pub fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        match self.iter_from(key)?.next().transpose()? {
            Some(cell) if cell.key == key => Ok(Some(cell.value)),
            _ => Ok(None),
        }
    }

    /// Remove the backing file.
    ///
    /// If iterators still hold the file, it is only marked obsolete and the
    /// last iterator to finish removes it.
    pub fn delete(self) -> Result<()> {
        match Arc::try_unwrap(self.file) {
            Ok(file) => {
                fs::remove_file(&file.path)?;
                Ok(())
            }
            Err(shared) => {
                debug!(path = %shared.path.display(), "sstable in use, deferring delete");
                shared.obsolete.store(true, Ordering::Release);
                Ok(())
            }
        }
    }

    /// Mark the file obsolete and keep `newer` on disk until this file is
    /// gone. Returns the handle that ends the chain once dropped.
    ///
    /// Retiring a batch newest to oldest and dropping the oldest handle
    /// unlinks the batch in generation order, however long readers pin any
    /// single file.
    pub(crate) fn retire(self, newer: Option<Arc<TableFile>>) -> Arc<TableFile> {
        *self.file.newer.lock() = newer;
        self.file.obsolete.store(true, Ordering::Release);
        self.file
    }

    pub fn path(&self) -> &Path {
        &self.file.path
    }

    pub fn meta(&self) -> &SSTableMeta {
        &self.meta
    }
}

impl Table for SSTable {
    fn scan(&self, from: &[u8], direction: Direction) -> Result<CellIter<'_>> {
        let iter: CellIter<'_> = match direction {
            Direction::Forward => Box::new(self.iter_from(from)?),
            Direction::Reverse => Box::new(self.iter_rev_from(from)?),
        };
        Ok(iter)
    }
}

impl Drop for TableFile {
    // Fields drop after this body, so `newer` is released only after our
    // own file is unlinked.
    fn drop(&mut self) {
        if !self.obsolete.load(Ordering::Acquire) {
            return;
        }
        let Err(e) = fs::remove_file(&self.path) else {
            debug!(path = %self.path.display(), "removed obsolete sstable");
            return;
        };
        warn!(
            path = %self.path.display(),
            error = %e,
            "failed to remove obsolete sstable, keeping newer ones"
        );
        // Unlinking newer files now could resurrect keys this one still
        // holds. Leave them for the next compaction.
        let mut next = self.newer.get_mut().take();
        while let Some(file) = next {
            file.obsolete.store(false, Ordering::Release);
            next = file.newer.lock().take();
        }
    }
}
