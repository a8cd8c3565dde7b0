use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;

/// Extension of published tables.
pub const TABLE_EXT: &str = "sst";
/// Extension reserved for tables still being written.
pub const TEMP_EXT: &str = "tmp";

/// Generation slot reserved for compaction output. Flushes start at 1.
pub const COMPACTION_GENERATION: u64 = 0;

/// What a file in the data directory is, judged by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Table(u64),
    Temp(u64),
}

/// `<dir>/000042.sst`
pub fn table_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("{generation:06}.{TABLE_EXT}"))
}

/// `<dir>/000042.tmp`
pub fn temp_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("{generation:06}.{TEMP_EXT}"))
}

/// Classify a path. Anything not named `<digits>.sst` or `<digits>.tmp`
/// is not ours.
pub fn parse(path: &Path) -> Option<FileKind> {
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let generation = stem.parse().ok()?;
    match path.extension()?.to_str()? {
        TABLE_EXT => Some(FileKind::Table(generation)),
        TEMP_EXT => Some(FileKind::Temp(generation)),
        _ => None,
    }
}

/// Atomically move a fully written temp file to its final name.
///
/// A reader of the directory sees either no table or the complete one.
/// Only a failed rename is an error: once it succeeded the table is in
/// place, and callers must treat it as published. A failed directory fsync
/// is logged, since the rename may then not survive a crash.
pub fn publish(tmp: &Path, dest: &Path) -> Result<()> {
    fs::rename(tmp, dest)?;
    if let Some(dir) = dest.parent() {
        if let Err(e) = sync_dir(dir) {
            warn!(dir = %dir.display(), error = %e, "failed to sync directory after rename");
        }
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip_through_parse() {
        let dir = Path::new("/data");
        assert_eq!(parse(&table_path(dir, 7)), Some(FileKind::Table(7)));
        assert_eq!(parse(&temp_path(dir, 1234567)), Some(FileKind::Temp(1234567)));
    }

    #[test]
    fn table_names_are_zero_padded() {
        assert_eq!(table_path(Path::new("d"), 3), Path::new("d/000003.sst"));
    }

    #[test]
    fn foreign_files_are_ignored() {
        for name in ["LOCK", "notes.txt", "abc.sst", ".sst", "12.sst.bak", "-1.sst", "7"] {
            assert_eq!(parse(Path::new(name)), None, "{name}");
        }
    }
}
