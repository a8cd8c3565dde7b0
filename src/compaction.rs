//! Full compaction: every SSTable merged into one.
//!
//! Only the newest version of each key survives and tombstones are
//! dropped, since there is nothing older left for them to shadow. The
//! merged table is published under the reserved generation before any old
//! file is touched.

use std::collections::BTreeMap;

use tracing::info;

use crate::db::DB;
use crate::error::Result;
use crate::filename::COMPACTION_GENERATION;
use crate::iterator::{self, CollapseEquals, Direction, DropTombstones, MergeIterator, Table};

/// Merge every table from the first key, keep the newest version of each
/// key and drop tombstones.
pub fn live_cells<'a, T>(
    tables: impl IntoIterator<Item = &'a T>,
) -> Result<DropTombstones<CollapseEquals<MergeIterator<'a>>>>
where
    T: Table + 'a,
{
    Ok(DropTombstones::new(iterator::merge_tables(
        tables,
        &[],
        Direction::Forward,
    )?))
}

impl DB {
    /// Merge all SSTables into one, dropping tombstones and superseded
    /// versions. The memtable is left alone.
    ///
    /// If writing the merged table fails, the old tables are untouched.
    /// Old files still read by open iterators are removed once those
    /// iterators are dropped.
    pub fn compact(&self) -> Result<()> {
        let mut state = self.state().write();
        if state.sstables.is_empty() {
            return Ok(());
        }

        let inputs = state.sstables.len();
        let input_bytes: u64 = state.sstables.values().map(|t| t.meta().file_size).sum();

        let merged = live_cells(state.sstables.values())?;
        let table = self.write_table(COMPACTION_GENERATION, merged)?;

        info!(
            inputs,
            input_bytes,
            entries = table.meta().entry_count,
            bytes = table.meta().file_size,
            "compacted sstables"
        );

        let old = std::mem::replace(
            &mut state.sstables,
            BTreeMap::from([(COMPACTION_GENERATION, table)]),
        );
        drop(state);

        // Oldest first: if we stop halfway, whatever is left on disk is
        // newer than what was removed, so no deleted key can resurface.
        // A reader may pin any input, so each input keeps the next newer
        // one alive until its own file is gone.
        let mut chain = None;
        for (generation, table) in old.into_iter().rev() {
            // The previous compaction output was overwritten by the rename.
            if generation == COMPACTION_GENERATION {
                continue;
            }
            chain = Some(table.retire(chain));
        }
        drop(chain);
        Ok(())
    }
}
