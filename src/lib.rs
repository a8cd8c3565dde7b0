//! # LSM-Tree Key-Value Store
//!
//! An embedded, ordered key-value store using the Log-Structured
//! Merge-Tree design. Keys and values are opaque byte strings; keys sort
//! lexicographically.
//!
//! ## Core idea
//! Instead of updating data in place (B-Tree), buffer writes in memory,
//! flush them as sorted immutable files, and merge those files on read and
//! on compaction. Every write carries a logical timestamp; when several
//! sources hold the same key, the most recent version wins.
//!
//! ```no_run
//! use lsm_kv::{DB, Options};
//!
//! # fn main() -> lsm_kv::Result<()> {
//! let db = DB::open(Options::new("/tmp/lsm-kv-demo"))?;
//! db.upsert(b"apple", b"red")?;
//! db.remove(b"banana")?;
//! for record in db.iter(b"a")? {
//!     let record = record?;
//!     println!("{:?} => {:?}", record.key, record.value);
//! }
//! db.compact()?;
//! db.close()?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod compaction;
pub mod db;
pub mod error;
pub mod filename;
pub mod iterator;
pub mod memtable;
pub mod sstable;
pub mod types;

// Public re-exports for the top-level API
pub use db::{DB, DbIterator, Options, Stats};
pub use error::{Error, Result};
pub use types::{Cell, Record, Value};
