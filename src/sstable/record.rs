use std::io::{self, Read};

use crate::error::{Error, Result};
use crate::types::{Cell, Value};

/// Tombstone flag byte values.
const LIVE: u8 = 0x00;
const TOMBSTONE: u8 = 0x01;

const KEY_LEN_SIZE: usize = 4;
const TIMESTAMP_SIZE: usize = 8;
const FLAG_SIZE: usize = 1;
const VALUE_LEN_SIZE: usize = 4;

/// One cell as stored in the data section of an SSTable.
///
/// On-disk format:
/// ```text
/// ┌────────────┬───────────┬───────────────┬─────────┬──────────────┬─────────────┐
/// │ KeyLen(4B) │ Key (var) │ Timestamp(8B) │ Flag(1B)│ ValLen(4B)*  │ Value(var)* │
/// └────────────┴───────────┴───────────────┴─────────┴──────────────┴─────────────┘
///                                            * only present when Flag = 0 (live)
/// ```
pub fn encode(cell: &Cell, buf: &mut Vec<u8>) {
    buf.reserve(encoded_size(cell));
    buf.extend_from_slice(&(cell.key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&cell.key);
    buf.extend_from_slice(&cell.value.timestamp().to_le_bytes());
    match &cell.value {
        Value::Data { bytes, .. } => {
            buf.push(LIVE);
            buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(bytes);
        }
        Value::Tombstone { .. } => buf.push(TOMBSTONE),
    }
}

/// Size of this cell when serialized on disk.
pub fn encoded_size(cell: &Cell) -> usize {
    let value = match &cell.value {
        Value::Data { bytes, .. } => VALUE_LEN_SIZE + bytes.len(),
        Value::Tombstone { .. } => 0,
    };
    KEY_LEN_SIZE + cell.key.len() + TIMESTAMP_SIZE + FLAG_SIZE + value
}

/// Read the next record. `Ok(None)` only at a clean end of input; a
/// record cut short anywhere is corruption.
pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<(Cell, usize)>> {
    let mut len_buf = [0u8; KEY_LEN_SIZE];
    match read_full(reader, &mut len_buf)? {
        0 => return Ok(None),
        KEY_LEN_SIZE => {}
        _ => return Err(Error::Corruption("record truncated in key length".into())),
    }
    let key_len = u32::from_le_bytes(len_buf) as usize;

    let key = read_exact_vec(reader, key_len, "key")?;

    let mut ts_buf = [0u8; TIMESTAMP_SIZE];
    read_exact(reader, &mut ts_buf, "timestamp")?;
    let timestamp = u64::from_le_bytes(ts_buf);

    let mut flag = [0u8; FLAG_SIZE];
    read_exact(reader, &mut flag, "tombstone flag")?;

    let value = match flag[0] {
        LIVE => {
            let mut len_buf = [0u8; VALUE_LEN_SIZE];
            read_exact(reader, &mut len_buf, "value length")?;
            let value_len = u32::from_le_bytes(len_buf) as usize;
            Value::data(timestamp, read_exact_vec(reader, value_len, "value")?)
        }
        TOMBSTONE => Value::tombstone(timestamp),
        other => {
            return Err(Error::Corruption(format!("invalid tombstone flag: {other}")));
        }
    };

    let cell = Cell::new(key, value);
    let size = encoded_size(&cell);
    Ok(Some((cell, size)))
}

/// Like `read_exact`, but reports how many bytes arrived before EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], field: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::Corruption(format!("record truncated in {field}")),
        _ => Error::Io(e),
    })
}

fn read_exact_vec<R: Read>(reader: &mut R, len: usize, field: &str) -> Result<Vec<u8>> {
    // Read through `take` so a garbage length can't force a huge allocation.
    let mut buf = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(Error::Corruption(format!("record truncated in {field}")));
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(cell: &Cell) -> Vec<u8> {
        let mut buf = Vec::new();
        encode(cell, &mut buf);
        buf
    }

    #[test]
    fn live_record_roundtrip() {
        let cell = Cell::new(b"apple".to_vec(), Value::data(42, b"red".to_vec()));
        let buf = encoded(&cell);
        assert_eq!(buf.len(), encoded_size(&cell));

        let (decoded, size) = read_from(&mut buf.as_slice()).unwrap().unwrap();
        assert_eq!(decoded, cell);
        assert_eq!(size, buf.len());
    }

    #[test]
    fn tombstone_has_no_value_section() {
        let cell = Cell::new(b"gone".to_vec(), Value::tombstone(7));
        let buf = encoded(&cell);
        assert_eq!(buf.len(), 4 + 4 + 8 + 1);

        let (decoded, _) = read_from(&mut buf.as_slice()).unwrap().unwrap();
        assert!(decoded.value.is_tombstone());
        assert_eq!(decoded.value.timestamp(), 7);
    }

    #[test]
    fn empty_input_is_clean_end() {
        let mut empty: &[u8] = &[];
        assert!(read_from(&mut empty).unwrap().is_none());
    }

    #[test]
    fn truncated_record_is_corruption() {
        let cell = Cell::new(b"key".to_vec(), Value::data(1, b"value".to_vec()));
        let buf = encoded(&cell);
        for cut in 1..buf.len() {
            let result = read_from(&mut &buf[..cut]);
            assert!(
                matches!(result, Err(Error::Corruption(_))),
                "cut at {cut} should be corruption"
            );
        }
    }

    #[test]
    fn bad_flag_is_corruption() {
        let cell = Cell::new(b"k".to_vec(), Value::tombstone(1));
        let mut buf = encoded(&cell);
        let flag_pos = buf.len() - 1;
        buf[flag_pos] = 0x7F;
        assert!(matches!(read_from(&mut buf.as_slice()), Err(Error::Corruption(_))));
    }
}
