use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{DbError, DbResult};

use super::{decode_chunk, FOOTER_LEN, INDEX_MAGIC};

pub struct SstReader {
    file: File,
    cipher_key: Option<Vec<u8>>,
    index: HashMap<Vec<u8>, u64>,
}

impl SstReader {
    /// Opens a table: validates the footer magic and loads the offset index.
    /// Record bodies are only read on demand.
    pub fn open(path: impl AsRef<Path>, cipher_key: Option<&[u8]>) -> DbResult<Self> {
        let mut file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        if len < FOOTER_LEN {
            return Err(DbError::Format("file too small to contain index".into()));
        }

        file.seek(SeekFrom::End(-(FOOTER_LEN as i64)))?;
        let mut tail = [0u8; FOOTER_LEN as usize];
        file.read_exact(&mut tail)?;

        let index_len = i32::from_le_bytes(tail[0..4].try_into().unwrap());
        if &tail[4..8] != INDEX_MAGIC {
            return Err(DbError::Format("missing QIDX footer".into()));
        }
        if index_len < 0 || index_len as u64 + FOOTER_LEN > len {
            return Err(DbError::Format(format!("bad index length {index_len}")));
        }

        file.seek(SeekFrom::End(-(FOOTER_LEN as i64 + index_len as i64)))?;
        let mut blob = vec![0u8; index_len as usize];
        file.read_exact(&mut blob)?;

        let encoded: HashMap<String, u64> = serde_json::from_slice(&blob)
            .map_err(|e| DbError::Format(format!("index decode: {e}")))?;
        let index = encoded
            .into_iter()
            .map(|(k, offset)| {
                hex::decode(&k)
                    .map(|key| (key, offset))
                    .map_err(|e| DbError::Format(format!("index key decode: {e}")))
            })
            .collect::<DbResult<HashMap<_, _>>>()?;

        Ok(Self {
            file,
            cipher_key: cipher_key.map(<[u8]>::to_vec),
            index,
        })
    }

    /// Point lookup via the index: one seek, one record decode.
    pub fn get(&mut self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        let offset = match self.index.get(key) {
            Some(&offset) => offset,
            None => return Ok(None),
        };
        let (_, value) = self.read_record(offset)?;
        Ok(Some(value))
    }

    /// Decodes every indexed record. Used by compaction.
    pub fn read_all(&mut self) -> DbResult<HashMap<Vec<u8>, Vec<u8>>> {
        let offsets: Vec<u64> = self.index.values().copied().collect();
        let mut all = HashMap::with_capacity(offsets.len());
        for offset in offsets {
            let (key, value) = self.read_record(offset)?;
            all.insert(key, value);
        }
        Ok(all)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn read_record(&mut self, offset: u64) -> DbResult<(Vec<u8>, Vec<u8>)> {
        self.file.seek(SeekFrom::Start(offset))?;
        let kb = self.read_frame()?;
        let key = decode_chunk(&kb, self.cipher_key.as_deref())?;
        let vb = self.read_frame()?;
        let value = decode_chunk(&vb, self.cipher_key.as_deref())?;
        Ok((key, value))
    }

    fn read_frame(&mut self) -> DbResult<Vec<u8>> {
        let mut len_bytes = [0u8; 4];
        self.file.read_exact(&mut len_bytes)?;
        let len = i32::from_le_bytes(len_bytes);
        if len < 0 {
            return Err(DbError::Format(format!("negative frame length {len}")));
        }
        let mut data = vec![0u8; len as usize];
        self.file.read_exact(&mut data)?;
        Ok(data)
    }
}
