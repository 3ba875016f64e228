use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::bloom::BloomFilter;
use crate::error::{DbError, DbResult};

use super::{encode_chunk, filter_path, INDEX_MAGIC};

pub struct SstWriter {
    file: BufWriter<File>,
    path: PathBuf,
    cipher_key: Option<Vec<u8>>,
    filter: BloomFilter,
    // hex(raw key) -> byte offset of the record's klen field
    index: HashMap<String, u64>,
    offset: u64,
    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
}

impl SstWriter {
    pub fn create(
        path: impl AsRef<Path>,
        cipher_key: Option<&[u8]>,
        bloom_bits: u32,
        bloom_hashes: u8,
    ) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            file: BufWriter::new(file),
            path,
            cipher_key: cipher_key.map(<[u8]>::to_vec),
            filter: BloomFilter::new(bloom_bits, bloom_hashes),
            index: HashMap::new(),
            offset: 0,
            min_key: None,
            max_key: None,
        })
    }

    pub fn add(&mut self, key: &[u8], value: &[u8]) -> DbResult<()> {
        self.index.insert(hex::encode(key), self.offset);
        self.filter.add(key);

        let kb = encode_chunk(key, self.cipher_key.as_deref())?;
        let vb = encode_chunk(value, self.cipher_key.as_deref())?;
        self.write_frame(&kb)?;
        self.write_frame(&vb)?;

        if self.min_key.as_deref().map_or(true, |min| key < min) {
            self.min_key = Some(key.to_vec());
        }
        if self.max_key.as_deref().map_or(true, |max| key > max) {
            self.max_key = Some(key.to_vec());
        }
        Ok(())
    }

    fn write_frame(&mut self, data: &[u8]) -> DbResult<()> {
        self.file.write_all(&(data.len() as i32).to_le_bytes())?;
        self.file.write_all(data)?;
        self.offset += 4 + data.len() as u64;
        Ok(())
    }

    /// Writes the index footer and the bloom sidecar; returns the key range.
    pub fn finish(mut self) -> DbResult<(Vec<u8>, Vec<u8>)> {
        let (min_key, max_key) = match (self.min_key.take(), self.max_key.take()) {
            (Some(min), Some(max)) => (min, max),
            _ => return Err(DbError::Format("cannot finish an empty table".into())),
        };

        let index_bytes = serde_json::to_vec(&self.index)
            .map_err(|e| DbError::Format(format!("index encode: {e}")))?;
        self.file.write_all(&index_bytes)?;
        self.file.write_all(&(index_bytes.len() as i32).to_le_bytes())?;
        self.file.write_all(INDEX_MAGIC)?;
        self.file.flush()?;
        self.file.get_ref().sync_all()?;

        self.filter.save(filter_path(&self.path))?;

        Ok((min_key, max_key))
    }
}
