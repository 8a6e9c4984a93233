//! Hashing utilities

use xxhash_rust::xxh3::xxh3_64;

/// CRC-32 of a table, sub-table or canonical name
pub fn name_hash(name: &str) -> u32 {
    crc32fast::hash(name.as_bytes())
}

/// xxh3-64 of a row key's canonical bytes
pub fn key_hash(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}

/// xxh3-64 checksum of file content
pub fn checksum(data: &[u8]) -> u64 {
    xxh3_64(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_hash() {
        // Standard CRC-32 check value
        assert_eq!(name_hash("123456789"), 0xCBF4_3926);
        assert_eq!(name_hash(""), 0);
    }

    #[test]
    fn test_key_hash_distinguishes_width() {
        assert_ne!(key_hash(&1u32.to_le_bytes()), key_hash(&1u64.to_le_bytes()));
    }
}
