// manifest - the durable list of live SSTs
//
// body layout (integers little-endian):
//
// | count (i32) | per entry: nameLen (i32) | name | minLen (i32) | min | maxLen (i32) | max |
//
// the body is snappy-compressed and, when an encryption key is configured,
// AES-GCM-encrypted. generations are numbered MANIFEST-NNNNN.qmf files; the
// CURRENT file names the active one and is the sole source of truth at open

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::crypto;
use crate::error::{DbError, DbResult};

pub const CURRENT_FILE: &str = "CURRENT";
pub const MANIFEST_PREFIX: &str = "MANIFEST-";
pub const MANIFEST_SUFFIX: &str = ".qmf";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SstMeta {
    pub filename: String,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
}

impl SstMeta {
    /// Key-range intersection test: [a,b] and [c,d] overlap iff a <= d and c <= b.
    pub fn overlaps(&self, other: &SstMeta) -> bool {
        self.min_key <= other.max_key && other.min_key <= self.max_key
    }
}

pub fn encode(tables: &[SstMeta], cipher_key: Option<&[u8]>) -> DbResult<Vec<u8>> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(tables.len() as i32).to_le_bytes());
    for table in tables {
        write_bytes(&mut buf, table.filename.as_bytes());
        write_bytes(&mut buf, &table.min_key);
        write_bytes(&mut buf, &table.max_key);
    }

    let compressed = snap::raw::Encoder::new()
        .compress_vec(&buf)
        .map_err(|e| DbError::Manifest(format!("snappy encode: {e}")))?;
    match cipher_key {
        Some(key) => Ok(crypto::encrypt(&compressed, key)?),
        None => Ok(compressed),
    }
}

pub fn decode(data: &[u8], cipher_key: Option<&[u8]>) -> DbResult<Vec<SstMeta>> {
    let compressed = match cipher_key {
        Some(key) => crypto::decrypt(data, key)?,
        None => data.to_vec(),
    };
    let raw = snap::raw::Decoder::new()
        .decompress_vec(&compressed)
        .map_err(|e| DbError::Manifest(format!("snappy decode: {e}")))?;

    let mut cursor = raw.as_slice();
    let count = i32::from_le_bytes(take(&mut cursor, 4)?.try_into().unwrap());
    if count < 0 {
        return Err(DbError::Manifest(format!("negative entry count {count}")));
    }

    let mut tables = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = read_bytes(&mut cursor)?;
        let filename = String::from_utf8(name)
            .map_err(|e| DbError::Manifest(format!("bad filename: {e}")))?;
        tables.push(SstMeta {
            filename,
            min_key: read_bytes(&mut cursor)?,
            max_key: read_bytes(&mut cursor)?,
        });
    }
    Ok(tables)
}

/// Commits a new generation: write the numbered file, repoint CURRENT, then
/// drop every older generation.
pub fn save(base: &Path, tables: &[SstMeta], cipher_key: Option<&[u8]>) -> DbResult<()> {
    let id = next_id(base)?;
    let filename = format!("{MANIFEST_PREFIX}{id:05}{MANIFEST_SUFFIX}");

    fs::write(base.join(&filename), encode(tables, cipher_key)?)?;
    fs::write(base.join(CURRENT_FILE), filename.as_bytes())?;

    for entry in fs::read_dir(base)? {
        let name = entry?.file_name().into_string().unwrap_or_default();
        if name.starts_with(MANIFEST_PREFIX) && name != filename {
            if let Err(e) = fs::remove_file(base.join(&name)) {
                tracing::warn!(file = %name, error = %e, "failed to remove stale manifest");
            }
        }
    }
    Ok(())
}

/// Loads the generation CURRENT points at; a missing CURRENT is a fresh
/// store and yields an empty list.
pub fn load(base: &Path, cipher_key: Option<&[u8]>) -> DbResult<Vec<SstMeta>> {
    let pointer = match fs::read(base.join(CURRENT_FILE)) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(DbError::Manifest(format!("read CURRENT: {e}"))),
    };
    let name = String::from_utf8_lossy(&pointer).trim().to_string();

    let data = fs::read(base.join(&name))
        .map_err(|e| DbError::Manifest(format!("read {name}: {e}")))?;
    decode(&data, cipher_key)
}

fn next_id(base: &Path) -> DbResult<u32> {
    let mut max = 0;
    for entry in fs::read_dir(base)? {
        let name = entry?.file_name().into_string().unwrap_or_default();
        if let Some(id) = name
            .strip_prefix(MANIFEST_PREFIX)
            .and_then(|s| s.strip_suffix(MANIFEST_SUFFIX))
            .and_then(|s| s.parse::<u32>().ok())
        {
            max = max.max(id);
        }
    }
    Ok(max + 1)
}

fn write_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as i32).to_le_bytes());
    buf.extend_from_slice(data);
}

fn read_bytes(cursor: &mut &[u8]) -> DbResult<Vec<u8>> {
    let len = i32::from_le_bytes(take(cursor, 4)?.try_into().unwrap());
    if len < 0 {
        return Err(DbError::Manifest(format!("negative field length {len}")));
    }
    Ok(take(cursor, len as usize)?.to_vec())
}

fn take<'a>(cursor: &mut &'a [u8], n: usize) -> DbResult<&'a [u8]> {
    if cursor.len() < n {
        return Err(DbError::Manifest("truncated manifest body".into()));
    }
    let (head, tail) = cursor.split_at(n);
    *cursor = tail;
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<SstMeta> {
        vec![
            SstMeta {
                filename: "sss-00000.qldb".into(),
                min_key: b"apple".to_vec(),
                max_key: b"melon".to_vec(),
            },
            SstMeta {
                filename: "sss-00001.qldb".into(),
                min_key: vec![0, 1, 255],
                max_key: vec![9, 9, 9],
            },
        ]
    }

    #[test]
    fn round_trip_plaintext() {
        let tables = sample();
        let data = encode(&tables, None).unwrap();
        assert_eq!(decode(&data, None).unwrap(), tables);
    }

    #[test]
    fn round_trip_encrypted() {
        let key = [7u8; 32];
        let tables = sample();
        let data = encode(&tables, Some(&key)).unwrap();
        assert_eq!(decode(&data, Some(&key)).unwrap(), tables);
    }

    #[test]
    fn round_trip_empty_list() {
        let data = encode(&[], None).unwrap();
        assert!(decode(&data, None).unwrap().is_empty());
    }

    #[test]
    fn wrong_key_is_a_crypto_error() {
        let key = [7u8; 32];
        let other = [8u8; 32];
        let data = encode(&sample(), Some(&key)).unwrap();
        assert!(matches!(
            decode(&data, Some(&other)),
            Err(DbError::Crypto(_))
        ));
    }

    #[test]
    fn garbage_is_a_manifest_error() {
        assert!(matches!(
            decode(b"definitely not snappy", None),
            Err(DbError::Manifest(_))
        ));
    }

    #[test]
    fn overlap_rule() {
        let a = SstMeta {
            filename: "a".into(),
            min_key: b"a".to_vec(),
            max_key: b"f".to_vec(),
        };
        let b = SstMeta {
            filename: "b".into(),
            min_key: b"f".to_vec(),
            max_key: b"p".to_vec(),
        };
        let c = SstMeta {
            filename: "c".into(),
            min_key: b"q".to_vec(),
            max_key: b"z".to_vec(),
        };
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(!b.overlaps(&c));
    }
}
