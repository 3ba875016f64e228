use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{DbError, DbResult};
use crate::memtable::{now_millis, Memtable};

use super::{WalOp, HEADER_LEN};

// a torn tail can carry garbage lengths; anything past this is treated as
// corruption rather than allocated
const MAX_FRAME_LEN: u32 = 1 << 30;

/// Replays the log into the memtable, oldest record first. A missing file is
/// a fresh store. A torn trailing record (short read or crc mismatch) ends
/// the scan silently; any other I/O failure is a `ReplayError`.
pub fn replay(path: impl AsRef<Path>, memtable: &Memtable) -> DbResult<()> {
    let file = match File::open(path.as_ref()) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(DbError::Replay(e.to_string())),
    };
    let mut reader = BufReader::new(file);
    let now = now_millis();

    loop {
        let mut header = [0u8; HEADER_LEN];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(DbError::Replay(e.to_string())),
        }

        let op = header[0];
        let expires_at_ms = u64::from_le_bytes(header[1..9].try_into().unwrap());
        let klen = u32::from_le_bytes(header[9..13].try_into().unwrap());
        let vlen = u32::from_le_bytes(header[13..17].try_into().unwrap());
        if klen > MAX_FRAME_LEN || vlen > MAX_FRAME_LEN {
            tracing::debug!(klen, vlen, "oversized wal frame, treating as torn tail");
            break;
        }

        let mut payload = vec![0u8; (klen + vlen) as usize];
        let mut crc_bytes = [0u8; 4];
        let read_body = reader
            .read_exact(&mut payload)
            .and_then(|()| reader.read_exact(&mut crc_bytes));
        match read_body {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(DbError::Replay(e.to_string())),
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header);
        hasher.update(&payload);
        if hasher.finalize() != u32::from_le_bytes(crc_bytes) {
            tracing::debug!("wal crc mismatch, treating as torn tail");
            break;
        }

        let value = payload.split_off(klen as usize);
        let key = payload;

        if op == WalOp::Put as u8 {
            if expires_at_ms == 0 {
                memtable.put(key, value);
            } else if expires_at_ms > now {
                memtable.put_with_expiry(key, value, expires_at_ms);
            }
            // entries that expired while the store was down are not revived
        } else if op == WalOp::Delete as u8 {
            memtable.delete(&key);
        } else {
            tracing::debug!(op, "unknown wal op, treating as torn tail");
            break;
        }
    }

    Ok(())
}
