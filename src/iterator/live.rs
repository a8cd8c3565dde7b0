use crate::error::Result;
use crate::types::Cell;

/// Drops tombstone cells, passing live cells and errors through.
///
/// Must run after `CollapseEquals`: a tombstone has to win its key's
/// conflict first, otherwise an older live version would leak out.
pub struct DropTombstones<I> {
    inner: I,
}

impl<I> DropTombstones<I> {
    pub fn new(inner: I) -> Self {
        DropTombstones { inner }
    }
}

impl<I> Iterator for DropTombstones<I>
where
    I: Iterator<Item = Result<Cell>>,
{
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(cell) if cell.value.is_tombstone() => continue,
                other => return Some(other),
            }
        }
    }
}
