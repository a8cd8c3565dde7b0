use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{Error, Result};
use crate::iterator::{CellIter, Direction};
use crate::types::Cell;

/// Merges multiple sorted iterators into a single sorted stream.
///
/// Used for:
/// - Range scans across the memtable snapshot + all SSTables
/// - Compaction (merging SSTables)
///
/// K-way merge over a binary heap keyed by each source's current cell, the
/// same algorithm as external merge sort. Duplicates are NOT removed here:
/// every version of a key comes out, newest first. `CollapseEquals` does
/// the deduplication.
///
/// If a source fails, the error is yielded once and the iterator ends.
pub struct MergeIterator<'a> {
    heap: BinaryHeap<HeapEntry<'a>>,
    direction: Direction,
    error: Option<Error>,
}

struct HeapEntry<'a> {
    cell: Cell,
    /// Position of the source in the input vector; tie breaker only.
    source: usize,
    direction: Direction,
    iter: CellIter<'a>,
}

impl PartialEq for HeapEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry<'_> {}

impl PartialOrd for HeapEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry<'_> {
    // BinaryHeap is a max-heap: reverse so the smallest cell pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.direction
            .compare(&self.cell, &other.cell)
            .then_with(|| self.source.cmp(&other.source))
            .reverse()
    }
}

impl<'a> MergeIterator<'a> {
    /// Build the heap from the first cell of every source.
    pub fn new(sources: Vec<CellIter<'a>>, direction: Direction) -> Result<Self> {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (source, mut iter) in sources.into_iter().enumerate() {
            if let Some(first) = iter.next() {
                heap.push(HeapEntry {
                    cell: first?,
                    source,
                    direction,
                    iter,
                });
            }
        }
        Ok(MergeIterator {
            heap,
            direction,
            error: None,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl Iterator for MergeIterator<'_> {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.error.take() {
            self.heap.clear();
            return Some(Err(e));
        }

        let HeapEntry {
            cell,
            source,
            direction,
            mut iter,
        } = self.heap.pop()?;

        match iter.next() {
            Some(Ok(next)) => self.heap.push(HeapEntry {
                cell: next,
                source,
                direction,
                iter,
            }),
            // Hand out the cell we already hold, fail on the following call.
            Some(Err(e)) => self.error = Some(e),
            None => {}
        }

        Some(Ok(cell))
    }
}
