// SSTs - immutable sorted-run tables
//
// format (integers little-endian):
// ┌─────────────────────────────────────────┐
// │            records (N)                  │
// │ each record:                            │
// │  klen (i32)                             │
// │  key bytes   (snappy, then AES-GCM      │
// │               when a key is configured) │
// │  vlen (i32)                             │
// │  value bytes (same pipeline)            │
// ├─────────────────────────────────────────┤
// │              index blob                 │
// │  JSON { hex(key) -> record offset }     │
// ├─────────────────────────────────────────┤
// │              footer                     │
// │  indexLen (i32)                         │
// │  magic "QIDX"                           │
// └─────────────────────────────────────────┘
//
// the bloom filter lives in a sidecar file at `<table path>.filter`, raw
// bit-array bytes only

pub mod reader;
pub mod writer;

pub use reader::SstReader;
pub use writer::SstWriter;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::crypto;
use crate::error::{DbError, DbResult};

pub const FILTER_SUFFIX: &str = ".filter";
pub const INDEX_MAGIC: &[u8; 4] = b"QIDX";

// i32 index length + 4 magic bytes
pub const FOOTER_LEN: u64 = 8;

/// Sidecar filter path for a table path: the suffix is appended, not
/// substituted, so `sss-00001.qldb` maps to `sss-00001.qldb.filter`.
pub fn filter_path(table: &Path) -> PathBuf {
    let mut name = OsString::from(table.as_os_str());
    name.push(FILTER_SUFFIX);
    PathBuf::from(name)
}

// write pipeline for one key or value: compress, then seal
pub(crate) fn encode_chunk(raw: &[u8], cipher_key: Option<&[u8]>) -> DbResult<Vec<u8>> {
    let compressed = snap::raw::Encoder::new()
        .compress_vec(raw)
        .map_err(|e| DbError::Format(format!("snappy encode: {e}")))?;
    match cipher_key {
        Some(key) => Ok(crypto::encrypt(&compressed, key)?),
        None => Ok(compressed),
    }
}

// read pipeline, the reverse order of encode_chunk
pub(crate) fn decode_chunk(stored: &[u8], cipher_key: Option<&[u8]>) -> DbResult<Vec<u8>> {
    let compressed = match cipher_key {
        Some(key) => crypto::decrypt(stored, key)?,
        None => stored.to_vec(),
    };
    snap::raw::Decoder::new()
        .decompress_vec(&compressed)
        .map_err(|e| DbError::Format(format!("snappy decode: {e}")))
}
