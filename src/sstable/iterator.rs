use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Take};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::sstable::reader::TableFile;
use crate::sstable::record;
use crate::types::Cell;

/// Ascending iterator over one SSTable.
///
/// Owns its own file handle and a reference to the table file, so the file
/// outlives any compaction that supersedes it while this iterator runs.
pub struct SSTableIterator {
    _file: Arc<TableFile>,
    reader: Take<BufReader<File>>,
    /// Records below this key are skipped; cleared after the first hit.
    from: Option<Vec<u8>>,
    done: bool,
}

impl SSTableIterator {
    pub(crate) fn new(file: Arc<TableFile>, start: u64, from: &[u8]) -> Result<Self> {
        let mut handle = File::open(&file.path)?;
        handle.seek(SeekFrom::Start(start))?;
        let reader = BufReader::new(handle).take(file.data_end.saturating_sub(start));
        Ok(SSTableIterator {
            _file: file,
            reader,
            from: Some(from.to_vec()),
            done: false,
        })
    }
}

impl Iterator for SSTableIterator {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match record::read_from(&mut self.reader) {
                Ok(Some((cell, _))) => {
                    if let Some(from) = &self.from {
                        if cell.key < *from {
                            continue;
                        }
                        self.from = None;
                    }
                    return Some(Ok(cell));
                }
                Ok(None) => self.done = true,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Descending iterator over one SSTable.
///
/// Records can only be decoded front to back, so this walks the sparse
/// index backwards: each step loads one index interval into memory and
/// hands its cells out in reverse.
pub struct SSTableRevIterator {
    file: Arc<TableFile>,
    handle: File,
    /// Cells of the current interval in ascending order; popped from the back.
    chunk: Vec<Cell>,
    /// Index entry of the next interval to load.
    next_chunk: Option<usize>,
    upto: Vec<u8>,
    done: bool,
}

impl SSTableRevIterator {
    pub(crate) fn new(
        file: Arc<TableFile>,
        first_chunk: Option<usize>,
        upto: &[u8],
    ) -> Result<Self> {
        let handle = File::open(&file.path)?;
        Ok(SSTableRevIterator {
            file,
            handle,
            chunk: Vec::new(),
            next_chunk: first_chunk,
            upto: upto.to_vec(),
            done: false,
        })
    }

    fn load_chunk(&mut self, i: usize) -> Result<()> {
        let index = &self.file.index;
        let start = index[i].offset;
        let end = index.get(i + 1).map_or(self.file.data_end, |e| e.offset);

        let mut buf = vec![0u8; end.saturating_sub(start) as usize];
        self.handle.seek(SeekFrom::Start(start))?;
        self.handle.read_exact(&mut buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::Corruption("sstable data truncated".into()),
            _ => Error::Io(e),
        })?;

        let mut data = buf.as_slice();
        while let Some((cell, _)) = record::read_from(&mut data)? {
            if cell.key <= self.upto {
                self.chunk.push(cell);
            }
        }
        Ok(())
    }
}

impl Iterator for SSTableRevIterator {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(cell) = self.chunk.pop() {
                return Some(Ok(cell));
            }
            if self.done {
                return None;
            }
            let Some(i) = self.next_chunk else {
                self.done = true;
                return None;
            };
            self.next_chunk = i.checked_sub(1);
            if let Err(e) = self.load_chunk(i) {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}
