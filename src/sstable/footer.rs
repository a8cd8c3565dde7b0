use crate::error::{Error, Result};

/// Magic number to identify SSTable files.
pub const SSTABLE_MAGIC: u64 = 0x4C534D4B_56544231; // "LSMKVTB1"

/// Summary of a written SSTable, returned by the builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SSTableMeta {
    /// File size in bytes.
    pub file_size: u64,
    /// Number of records (including tombstones).
    pub entry_count: u64,
    /// Largest timestamp of any record, 0 for an empty table.
    pub max_timestamp: u64,
}

/// An entry in the SSTable's sparse index.
/// Points at the record that starts an index interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Key of the record at `offset`.
    pub key: Vec<u8>,
    /// Byte offset of that record in the file.
    pub offset: u64,
}

impl IndexEntry {
    /// Encode this index entry.
    /// Format: [key_len(4B)][key][offset(8B)]
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.offset.to_le_bytes());
    }

    /// Decode an index entry from bytes, returning (entry, bytes_consumed).
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 4 {
            return Err(Error::Corruption("index entry too short".into()));
        }
        let key_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let total = 4 + key_len + 8;
        if data.len() < total {
            return Err(Error::Corruption("index entry truncated".into()));
        }
        let key = data[4..4 + key_len].to_vec();
        let offset = read_u64(&data[4 + key_len..total]);
        Ok((IndexEntry { key, offset }, total))
    }
}

/// The footer sits at the end of the SSTable file.
/// It tells the reader where the data section ends and the index begins.
///
/// ```text
/// ┌──────────────────────────────────────┐
/// │ Index offset (8B)                    │
/// │ Entry count (8B)                     │
/// │ Max timestamp (8B)                   │
/// │ Magic number (8B)                    │
/// └──────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    pub index_offset: u64,
    pub entry_count: u64,
    pub max_timestamp: u64,
    pub magic: u64,
}

impl Footer {
    /// Size of the footer in bytes (fixed).
    pub const SIZE: usize = 8 * 4; // 32 bytes

    pub fn new(index_offset: u64, entry_count: u64, max_timestamp: u64) -> Self {
        Footer {
            index_offset,
            entry_count,
            max_timestamp,
            magic: SSTABLE_MAGIC,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.index_offset.to_le_bytes());
        buf.extend_from_slice(&self.entry_count.to_le_bytes());
        buf.extend_from_slice(&self.max_timestamp.to_le_bytes());
        buf.extend_from_slice(&self.magic.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::Corruption("footer too short".into()));
        }
        let index_offset = read_u64(&data[0..8]);
        let entry_count = read_u64(&data[8..16]);
        let max_timestamp = read_u64(&data[16..24]);
        let magic = read_u64(&data[24..32]);

        if magic != SSTABLE_MAGIC {
            return Err(Error::Corruption(format!(
                "bad magic: expected {:#x}, got {:#x}",
                SSTABLE_MAGIC, magic
            )));
        }

        Ok(Footer {
            index_offset,
            entry_count,
            max_timestamp,
            magic,
        })
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_roundtrip() {
        let footer = Footer::new(4096, 120, 1_700_000_000_000_000);
        let encoded = footer.encode();
        assert_eq!(encoded.len(), Footer::SIZE);
        assert_eq!(Footer::decode(&encoded).unwrap(), footer);
    }

    #[test]
    fn footer_bad_magic() {
        let mut encoded = Footer::new(0, 0, 0).encode();
        encoded[24] ^= 0xFF;
        assert!(matches!(Footer::decode(&encoded), Err(Error::Corruption(_))));
    }

    #[test]
    fn footer_too_short() {
        assert!(Footer::decode(&[0u8; 10]).is_err());
    }

    #[test]
    fn index_entry_roundtrip() {
        let entry = IndexEntry {
            key: b"cherry".to_vec(),
            offset: 8192,
        };
        let mut encoded = Vec::new();
        entry.encode(&mut encoded);
        let (decoded, consumed) = IndexEntry::decode(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, entry);
    }

    #[test]
    fn index_entry_truncated() {
        let entry = IndexEntry {
            key: b"cherry".to_vec(),
            offset: 1,
        };
        let mut encoded = Vec::new();
        entry.encode(&mut encoded);
        assert!(IndexEntry::decode(&encoded[..encoded.len() - 1]).is_err());
    }
}
