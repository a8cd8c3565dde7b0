//! Immutable sorted tables on disk.
//!
//! File layout:
//! ```text
//! ┌──────────────────────────────────────┐
//! │ Record 0                             │  data section, ascending keys
//! │ Record 1                             │  (see `record`)
//! │ ...                                  │
//! ├──────────────────────────────────────┤
//! │ Index entry 0 → record 0             │  sparse index, one entry per
//! │ Index entry 1 → record N             │  `index_interval` records
//! │ ...                                  │
//! ├──────────────────────────────────────┤
//! │ Footer (32B)                         │
//! └──────────────────────────────────────┘
//! ```

pub mod builder;
pub mod footer;
pub mod iterator;
pub mod reader;
pub mod record;

pub use builder::SSTableBuilder;
pub use footer::SSTableMeta;
pub use iterator::{SSTableIterator, SSTableRevIterator};
pub use reader::SSTable;
