use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::sstable::footer::{Footer, IndexEntry, SSTableMeta};
use crate::sstable::record;
use crate::types::Cell;

/// Builds an SSTable file from a sorted stream of cells.
///
/// Used during:
/// - Memtable flush (sorted memtable → SSTable)
/// - Compaction (merged iterators → new SSTable)
///
/// Build process:
/// 1. Add cells one by one (keys must be strictly increasing)
/// 2. Every `index_interval`-th record gets a sparse index entry
/// 3. finish() writes the index, footer, flushes and fsyncs
///
/// The builder writes wherever it is pointed. Callers give it a temporary
/// path and rename into place afterwards.
pub struct SSTableBuilder {
    writer: BufWriter<File>,
    index_entries: Vec<IndexEntry>,
    index_interval: u64,
    /// Tracks current write position in the file.
    data_offset: u64,
    entry_count: u64,
    max_timestamp: u64,
    last_key: Option<Vec<u8>>,
    /// Reused encode buffer.
    scratch: Vec<u8>,
}

impl SSTableBuilder {
    /// Create a new SSTable builder that writes to the given path.
    pub fn new(path: &Path, index_interval: usize) -> Result<Self> {
        let file = File::create(path)?;
        Ok(SSTableBuilder {
            writer: BufWriter::new(file),
            index_entries: Vec::new(),
            index_interval: index_interval.max(1) as u64,
            data_offset: 0,
            entry_count: 0,
            max_timestamp: 0,
            last_key: None,
            scratch: Vec::new(),
        })
    }

    /// Append a cell. Keys MUST be strictly increasing.
    pub fn add(&mut self, cell: &Cell) -> Result<()> {
        if let Some(last) = &self.last_key {
            if cell.key <= *last {
                return Err(Error::InvalidState(format!(
                    "sstable keys must be strictly increasing: {:?} after {:?}",
                    cell.key, last
                )));
            }
        }

        if self.entry_count % self.index_interval == 0 {
            self.index_entries.push(IndexEntry {
                key: cell.key.clone(),
                offset: self.data_offset,
            });
        }

        self.scratch.clear();
        record::encode(cell, &mut self.scratch);
        self.writer.write_all(&self.scratch)?;

        self.data_offset += self.scratch.len() as u64;
        self.entry_count += 1;
        self.max_timestamp = self.max_timestamp.max(cell.value.timestamp());
        self.last_key = Some(cell.key.clone());
        Ok(())
    }

    /// Finalize the SSTable: write index, footer, fsync.
    pub fn finish(mut self) -> Result<SSTableMeta> {
        let index_offset = self.data_offset;
        let mut index_data = Vec::new();
        for entry in &self.index_entries {
            entry.encode(&mut index_data);
        }
        self.writer.write_all(&index_data)?;

        let footer = Footer::new(index_offset, self.entry_count, self.max_timestamp);
        self.writer.write_all(&footer.encode())?;

        // Flush buffer + fsync to guarantee durability before any rename.
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        Ok(SSTableMeta {
            file_size: index_offset + index_data.len() as u64 + Footer::SIZE as u64,
            entry_count: self.entry_count,
            max_timestamp: self.max_timestamp,
        })
    }
}
