// bloom filter kept as a sidecar next to each SST for negative lookups
//
// all k hash values come from a single SHA-256 digest of the key: the first
// 4*k digest bytes are read as k little-endian u32s. the on-disk form is the
// raw bit array; the (m, k) parameters are engine configuration and are not
// stored in the file

use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

// one digest is 32 bytes, so at most 8 independent u32s can be derived
pub const MAX_HASHES: u8 = 8;

pub struct BloomFilter {
    bits: Vec<u8>,
    size: u32,
    hashes: u8,
}

impl BloomFilter {
    pub fn new(size: u32, hashes: u8) -> Self {
        Self {
            bits: vec![0u8; (size / 8 + 1) as usize],
            size,
            hashes,
        }
    }

    pub fn add(&mut self, key: &[u8]) {
        for h in self.hash_values(key) {
            self.set_bit(h % self.size);
        }
    }

    // true means the key MIGHT be in the table; false is definitive
    pub fn test(&self, key: &[u8]) -> bool {
        self.hash_values(key)
            .into_iter()
            .all(|h| self.get_bit(h % self.size))
    }

    fn hash_values(&self, key: &[u8]) -> Vec<u32> {
        let digest = Sha256::digest(key);
        let bytes = digest.as_slice();
        (0..self.hashes as usize)
            .map(|i| u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap()))
            .collect()
    }

    fn set_bit(&mut self, pos: u32) {
        self.bits[(pos / 8) as usize] |= 1 << (pos % 8);
    }

    fn get_bit(&self, pos: u32) -> bool {
        self.bits[(pos / 8) as usize] & (1 << (pos % 8)) != 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn from_bytes(data: &[u8], size: u32, hashes: u8) -> Self {
        let mut filter = Self::new(size, hashes);
        let n = filter.bits.len().min(data.len());
        filter.bits[..n].copy_from_slice(&data[..n]);
        filter
    }

    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        fs::write(path, &self.bits)
    }

    pub fn load(path: impl AsRef<Path>, size: u32, hashes: u8) -> io::Result<Self> {
        let data = fs::read(path)?;
        Ok(Self::from_bytes(&data, size, hashes))
    }
}
