pub mod collapse;
pub mod live;
pub mod merge;

use std::cmp::Ordering;

pub use collapse::CollapseEquals;
pub use live::DropTombstones;
pub use merge::MergeIterator;

use crate::error::Result;
use crate::types::Cell;

/// A boxed, fallible stream of cells. Reading an SSTable can fail halfway,
/// so every source yields `Result<Cell>`.
pub type CellIter<'a> = Box<dyn Iterator<Item = Result<Cell>> + Send + 'a>;

/// Iteration direction over keys.
///
/// Within one key both directions yield the most recent version first,
/// which is what `CollapseEquals` relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Keys >= `from`, ascending.
    Forward,
    /// Keys <= `from`, descending.
    Reverse,
}

impl Direction {
    /// The merge ordering for this direction.
    pub fn compare(self, a: &Cell, b: &Cell) -> Ordering {
        let by_key = match self {
            Direction::Forward => a.key.cmp(&b.key),
            Direction::Reverse => b.key.cmp(&a.key),
        };
        by_key.then_with(|| a.value.cmp_recency(&b.value))
    }
}

/// A sorted source of cells: the memtable or an SSTable.
///
/// The merge is written once against this trait; it does not care which
/// source is in memory and which on disk.
pub trait Table {
    /// Cells starting at `from` (inclusive) in `direction` order,
    /// tombstones included.
    fn scan(&self, from: &[u8], direction: Direction) -> Result<CellIter<'_>>;
}

/// Merge sorted sources and keep only the newest version of each key.
///
/// Tombstones are still present in the output; wrap in `DropTombstones`
/// to hide them.
pub fn merged(
    sources: Vec<CellIter<'_>>,
    direction: Direction,
) -> Result<CollapseEquals<MergeIterator<'_>>> {
    Ok(CollapseEquals::new(MergeIterator::new(sources, direction)?))
}

/// Scan every table from `from` and merge the results.
pub fn merge_tables<'a, T>(
    tables: impl IntoIterator<Item = &'a T>,
    from: &[u8],
    direction: Direction,
) -> Result<CollapseEquals<MergeIterator<'a>>>
where
    T: Table + 'a,
{
    let sources = tables
        .into_iter()
        .map(|table| table.scan(from, direction))
        .collect::<Result<Vec<_>>>()?;
    merged(sources, direction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn cell(key: &str, ts: u64) -> Cell {
        Cell::new(key.as_bytes().to_vec(), Value::tombstone(ts))
    }

    #[test]
    fn forward_orders_keys_ascending() {
        assert_eq!(Direction::Forward.compare(&cell("a", 1), &cell("b", 9)), Ordering::Less);
    }

    #[test]
    fn reverse_orders_keys_descending() {
        assert_eq!(Direction::Reverse.compare(&cell("a", 1), &cell("b", 9)), Ordering::Greater);
    }

    #[test]
    fn both_directions_put_newest_first_within_a_key() {
        for dir in [Direction::Forward, Direction::Reverse] {
            assert_eq!(dir.compare(&cell("k", 7), &cell("k", 3)), Ordering::Less);
        }
    }
}
