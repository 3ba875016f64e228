use crate::bloom;
use crate::crypto;
use crate::error::{DbError, DbResult};

pub const DEFAULT_COMPACT_LIMIT: usize = 10;
pub const DEFAULT_BLOOM_BIT_SIZE: u32 = 8000;
pub const DEFAULT_BLOOM_HASH_COUNT: u8 = 4;

/// Engine tunables, all optional: `Options::default()` is a working
/// plaintext configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// 32-byte AES-256 key; `None` stores everything in plaintext.
    pub encryption_key: Option<Vec<u8>>,
    /// Minimum size of an overlapping SST group before `compact` merges it.
    pub compact_limit: usize,
    /// Bloom filter width in bits.
    pub bloom_bit_size: u32,
    /// Bloom hash functions per key, at most [`bloom::MAX_HASHES`].
    pub bloom_hash_count: u8,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            encryption_key: None,
            compact_limit: DEFAULT_COMPACT_LIMIT,
            bloom_bit_size: DEFAULT_BLOOM_BIT_SIZE,
            bloom_hash_count: DEFAULT_BLOOM_HASH_COUNT,
        }
    }
}

impl Options {
    pub(crate) fn validate(&self) -> DbResult<()> {
        if let Some(key) = &self.encryption_key {
            if key.len() != crypto::KEY_LEN {
                return Err(DbError::Config(format!(
                    "encryption key must be {} bytes (AES-256), got {}",
                    crypto::KEY_LEN,
                    key.len()
                )));
            }
        }
        if self.compact_limit == 0 {
            return Err(DbError::Config("compact limit must be non-zero".into()));
        }
        if self.bloom_bit_size == 0 {
            return Err(DbError::Config("bloom bit size must be non-zero".into()));
        }
        if self.bloom_hash_count == 0 || self.bloom_hash_count > bloom::MAX_HASHES {
            return Err(DbError::Config(format!(
                "bloom hash count must be in 1..={}, got {}",
                bloom::MAX_HASHES,
                self.bloom_hash_count
            )));
        }
        Ok(())
    }
}
