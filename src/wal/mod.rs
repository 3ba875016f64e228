// write ahead log
//
// one binary record per operation:
//
// | op (u8) | expires_at_ms (u64) | klen (u32) | vlen (u32) | key | value | crc32 (u32) |
//
// integers little-endian, crc over everything before it. expires_at_ms is 0
// for records without a TTL. length-prefixed framing means keys and values
// may contain any byte

pub mod replay;

pub use replay::replay;

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

const HEADER_LEN: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalOp {
    Put = 1,
    Delete = 2,
}

pub struct Wal {
    file: File,
}

impl Wal {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }

    pub fn append(
        &mut self,
        op: WalOp,
        key: &[u8],
        value: &[u8],
        expires_at_ms: u64,
    ) -> io::Result<()> {
        let record = encode_record(op, key, value, expires_at_ms);
        self.file.write_all(&record)
    }

    /// One write syscall for the whole batch; not atomic against a crash,
    /// torn tails are dropped at replay.
    pub fn append_batch<'a, I>(&mut self, records: I) -> io::Result<()>
    where
        I: IntoIterator<Item = (WalOp, &'a [u8], &'a [u8], u64)>,
    {
        let mut buf = Vec::new();
        for (op, key, value, expires_at_ms) in records {
            buf.extend_from_slice(&encode_record(op, key, value, expires_at_ms));
        }
        self.file.write_all(&buf)
    }

    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    /// Truncates the log. Only called after a flush has committed the
    /// memtable contents to an SST named by the current manifest.
    pub fn reset(&mut self) -> io::Result<()> {
        self.file.set_len(0)
    }

    pub fn close(mut self) -> io::Result<()> {
        self.sync()
    }
}

fn encode_record(op: WalOp, key: &[u8], value: &[u8], expires_at_ms: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + key.len() + value.len() + 4);
    buf.push(op as u8);
    buf.extend_from_slice(&expires_at_ms.to_le_bytes());
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf);
    let crc = hasher.finalize();
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}
