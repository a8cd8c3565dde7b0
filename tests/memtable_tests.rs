// MemTable: versioned writes, tombstones, size accounting, iteration.

use std::sync::Arc;

use lsm_kv::Value;
use lsm_kv::clock::TimestampGenerator;
use lsm_kv::iterator::{Direction, Table};
use lsm_kv::memtable::{MemTable, MemTableIter};

fn memtable() -> MemTable {
    MemTable::new(Arc::new(TimestampGenerator::new()))
}

fn keys(cells: impl Iterator<Item = lsm_kv::Cell>) -> Vec<Vec<u8>> {
    cells.map(|c| c.key).collect()
}

// =============================================================================
// Test 1: Upsert then get returns the live value
// =============================================================================
#[test]
fn upsert_then_get_returns_value() {
    let mut mt = memtable();
    mt.upsert(b"key".to_vec(), b"value".to_vec());

    let value = mt.get(b"key").unwrap();
    assert_eq!(value.bytes().unwrap(), b"value");
}

// =============================================================================
// Test 2: Remove leaves a tombstone, not absence
// =============================================================================
#[test]
fn remove_writes_tombstone() {
    let mut mt = memtable();
    mt.upsert(b"key".to_vec(), b"value".to_vec());
    mt.remove(b"key".to_vec());

    assert!(mt.get(b"key").unwrap().is_tombstone());
    assert_eq!(mt.len(), 1);
}

// =============================================================================
// Test 3: Remove on a never-written key still records a tombstone
// =============================================================================
#[test]
fn remove_nonexistent_key_records_tombstone() {
    let mut mt = memtable();
    mt.remove(b"never_existed".to_vec());

    assert!(mt.get(b"never_existed").unwrap().is_tombstone());
    assert_eq!(mt.size_bytes(), b"never_existed".len() as u64);
}

// =============================================================================
// Test 4: Every write gets a newer timestamp
// =============================================================================
#[test]
fn overwrites_get_increasing_timestamps() {
    let mut mt = memtable();
    mt.upsert(b"k".to_vec(), b"1".to_vec());
    let first = mt.get(b"k").unwrap().timestamp();
    mt.remove(b"k".to_vec());
    let second = mt.get(b"k").unwrap().timestamp();
    mt.upsert(b"k".to_vec(), b"3".to_vec());
    let third = mt.get(b"k").unwrap().timestamp();

    assert!(first < second && second < third);
}

// =============================================================================
// Test 5: Size is exactly key + value bytes after N upserts
// =============================================================================
#[test]
fn size_is_sum_of_keys_and_values() {
    let mut mt = memtable();
    let mut expected = 0u64;
    for i in 0..200u32 {
        let key = format!("key_{i}").into_bytes();
        let value = vec![b'x'; (i % 37) as usize];
        expected += (key.len() + value.len()) as u64;
        mt.upsert(key, value);
    }
    assert_eq!(mt.size_bytes(), expected);
}

// =============================================================================
// Test 6: Tombstoning everything leaves only key bytes
// =============================================================================
#[test]
fn size_after_removing_everything_is_key_bytes() {
    let mut mt = memtable();
    let mut key_bytes = 0u64;
    for i in 0..100u32 {
        let key = format!("k{i}").into_bytes();
        key_bytes += key.len() as u64;
        mt.upsert(key, b"some value".to_vec());
    }
    for i in 0..100u32 {
        mt.remove(format!("k{i}").into_bytes());
    }
    assert_eq!(mt.size_bytes(), key_bytes);
}

// =============================================================================
// Test 7: Size deltas on overwrite, tombstone and resurrection
// =============================================================================
#[test]
fn size_tracks_each_transition() {
    let mut mt = memtable();

    mt.upsert(b"abc".to_vec(), b"12345".to_vec());
    assert_eq!(mt.size_bytes(), 3 + 5);

    // live -> live: payload delta
    mt.upsert(b"abc".to_vec(), b"12".to_vec());
    assert_eq!(mt.size_bytes(), 3 + 2);

    // live -> tombstone: payload removed
    mt.remove(b"abc".to_vec());
    assert_eq!(mt.size_bytes(), 3);

    // tombstone -> tombstone: unchanged
    mt.remove(b"abc".to_vec());
    assert_eq!(mt.size_bytes(), 3);

    // tombstone -> live: payload added back
    mt.upsert(b"abc".to_vec(), b"xyz".to_vec());
    assert_eq!(mt.size_bytes(), 3 + 3);
}

// =============================================================================
// Test 8: Iterator includes tombstones
// =============================================================================
// When flushing to SSTable we MUST include tombstones so they propagate to
// disk and keep hiding older values.
#[test]
fn iterator_includes_tombstones() {
    let mut mt = memtable();
    mt.upsert(b"a".to_vec(), b"value_a".to_vec());
    mt.upsert(b"b".to_vec(), b"value_b".to_vec());
    mt.remove(b"b".to_vec());
    mt.upsert(b"c".to_vec(), b"value_c".to_vec());

    let cells: Vec<_> = mt.iter_from(b"").collect();
    assert_eq!(cells.len(), 3);
    assert_eq!(cells[1].key, b"b");
    assert!(cells[1].value.is_tombstone());
}

// =============================================================================
// Test 9: Ascending iteration from a key
// =============================================================================
#[test]
fn iter_from_starts_at_key() {
    let mut mt = memtable();
    for k in ["delta", "alpha", "charlie", "bravo"] {
        mt.upsert(k.as_bytes().to_vec(), b"v".to_vec());
    }

    assert_eq!(
        keys(mt.iter_from(b"bravo")),
        vec![b"bravo".to_vec(), b"charlie".to_vec(), b"delta".to_vec()]
    );
    assert_eq!(keys(mt.iter_from(b"c")), vec![b"charlie".to_vec(), b"delta".to_vec()]);
    assert!(mt.iter_from(b"echo").next().is_none());
}

// =============================================================================
// Test 10: Descending iteration from a key
// =============================================================================
#[test]
fn iter_rev_from_walks_down() {
    let mut mt = memtable();
    for k in ["delta", "alpha", "charlie", "bravo"] {
        mt.upsert(k.as_bytes().to_vec(), b"v".to_vec());
    }

    assert_eq!(
        keys(mt.iter_rev_from(b"charlie")),
        vec![b"charlie".to_vec(), b"bravo".to_vec(), b"alpha".to_vec()]
    );
    assert_eq!(keys(mt.iter_rev_from(b"c")), vec![b"bravo".to_vec(), b"alpha".to_vec()]);
    // Nothing sorts below the empty key.
    assert!(mt.iter_rev_from(b"").next().is_none());
}

// =============================================================================
// Test 11: Table::scan agrees with the inherent iterators
// =============================================================================
#[test]
fn table_scan_matches_iterators() {
    let mut mt = memtable();
    for i in 0..20u32 {
        mt.upsert(format!("{:02}", i).into_bytes(), vec![i as u8]);
    }

    let forward: Vec<_> =
        mt.scan(b"05", Direction::Forward).unwrap().map(Result::unwrap).collect();
    assert_eq!(forward, mt.iter_from(b"05").collect::<Vec<_>>());

    let reverse: Vec<_> =
        mt.scan(b"05", Direction::Reverse).unwrap().map(Result::unwrap).collect();
    assert_eq!(reverse, mt.iter_rev_from(b"05").collect::<Vec<_>>());
    assert_eq!(reverse.len(), 6);
}

// =============================================================================
// Test 12: Values carry their payload
// =============================================================================
#[test]
fn iterated_values_keep_payload() {
    let mut mt = memtable();
    mt.upsert(b"k".to_vec(), b"payload".to_vec());
    let cell = mt.iter_from(b"k").next().unwrap();
    assert!(matches!(cell.value, Value::Data { ref bytes, .. } if bytes == b"payload"));
}

// =============================================================================
// Test 13: A shared snapshot is not touched by later copy-on-write updates
// =============================================================================
#[test]
fn snapshot_iter_ignores_later_writes() {
    let mut shared = Arc::new(memtable());
    for k in ["a", "b", "c"] {
        Arc::make_mut(&mut shared).upsert(k.as_bytes().to_vec(), b"old".to_vec());
    }

    let mut forward = MemTableIter::new(Arc::clone(&shared), b"b", Direction::Forward);
    let reverse = MemTableIter::new(Arc::clone(&shared), b"b", Direction::Reverse);
    assert_eq!(forward.next().unwrap().key, b"b");

    Arc::make_mut(&mut shared).upsert(b"bb".to_vec(), b"new".to_vec());
    Arc::make_mut(&mut shared).remove(b"c".to_vec());

    let rest: Vec<_> = forward.collect();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].key, b"c");
    assert!(!rest[0].value.is_tombstone());
    assert_eq!(keys(reverse), vec![b"b".to_vec(), b"a".to_vec()]);

    assert_eq!(shared.len(), 4);
    assert!(shared.get(b"c").unwrap().is_tombstone());
}
