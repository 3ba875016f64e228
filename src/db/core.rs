use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::bloom::BloomFilter;
use crate::compaction;
use crate::config::Options;
use crate::error::{DbError, DbResult};
use crate::manifest::{self, SstMeta};
use crate::memtable::{now_millis, Memtable};
use crate::sst::{self, SstReader, SstWriter};
use crate::subscribe::{ChangeEvent, EventKind, Subscriptions};
use crate::wal::{self, Wal, WalOp};

use super::iterator::DbIterator;
use super::{LOG_FILE, SST_PREFIX, SST_SUFFIX};

/// The storage engine: a WAL-backed memtable in front of bloom-filtered
/// SSTs, with the live table set recorded in the manifest.
///
/// All methods take `&self`. Reads may run concurrently; mutation of the
/// live table set (`flush`, `compact`) is reserved to a single writer.
pub struct Db {
    base_path: PathBuf,
    opts: Options,
    memtable: Memtable,
    wal: Mutex<Wal>,
    // manifest order: oldest first, lookups walk it from the back
    tables: ArcSwap<Vec<SstMeta>>,
    subs: Subscriptions,
}

impl Db {
    /// Opens or creates a store under `path`: loads the manifest named by
    /// CURRENT, collects orphan table files, and replays the WAL into a
    /// fresh memtable.
    pub fn open(path: impl AsRef<Path>, opts: Options) -> DbResult<Self> {
        opts.validate()?;

        let base_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;

        let wal_path = base_path.join(LOG_FILE);
        let wal = Wal::open(&wal_path)?;

        let tables = manifest::load(&base_path, opts.encryption_key.as_deref())?;
        collect_orphans(&base_path, &tables);

        let memtable = Memtable::new();
        wal::replay(&wal_path, &memtable)?;

        Ok(Self {
            base_path,
            opts,
            memtable,
            wal: Mutex::new(wal),
            tables: ArcSwap::from_pointee(tables),
            subs: Subscriptions::new(),
        })
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> DbResult<()> {
        self.memtable.put(key.to_vec(), value.to_vec());
        self.subs.publish(ChangeEvent {
            kind: EventKind::Put,
            key: key.to_vec(),
            value: value.to_vec(),
        });
        self.wal.lock().append(WalOp::Put, key, value, 0)?;
        Ok(())
    }

    /// Put with a time-to-live: the entry disappears from lookups once the
    /// TTL elapses. The expiration rides in the WAL record, so it survives
    /// a restart.
    pub fn put_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> DbResult<()> {
        let expires_at_ms = now_millis() + ttl.as_millis() as u64;
        self.memtable
            .put_with_expiry(key.to_vec(), value.to_vec(), expires_at_ms);
        self.subs.publish(ChangeEvent {
            kind: EventKind::Put,
            key: key.to_vec(),
            value: value.to_vec(),
        });
        self.wal.lock().append(WalOp::Put, key, value, expires_at_ms)?;
        Ok(())
    }

    /// Inserts several pairs with a single batched WAL write. Not atomic
    /// against a crash; a torn tail drops trailing records at replay.
    pub fn put_batch<I>(&self, pairs: I) -> DbResult<()>
    where
        I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    {
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = pairs.into_iter().collect();
        if pairs.is_empty() {
            return Ok(());
        }

        for (key, value) in &pairs {
            self.memtable.put(key.clone(), value.clone());
            self.subs.publish(ChangeEvent {
                kind: EventKind::Put,
                key: key.clone(),
                value: value.clone(),
            });
        }

        self.wal.lock().append_batch(
            pairs
                .iter()
                .map(|(key, value)| (WalOp::Put, key.as_slice(), value.as_slice(), 0)),
        )?;
        Ok(())
    }

    pub fn delete(&self, key: &[u8]) -> DbResult<()> {
        self.memtable.delete(key);
        self.subs.publish(ChangeEvent {
            kind: EventKind::Delete,
            key: key.to_vec(),
            value: Vec::new(),
        });
        self.wal.lock().append(WalOp::Delete, key, &[], 0)?;
        Ok(())
    }

    /// Memtable first, then live tables newest to oldest. Each table's
    /// bloom sidecar is consulted before the table itself is opened; an
    /// unreadable sidecar falls through to the table.
    pub fn get(&self, key: &[u8]) -> DbResult<Vec<u8>> {
        if let Some(value) = self.memtable.get(key) {
            return Ok(value);
        }

        let tables = self.tables.load();
        for meta in tables.iter().rev() {
            let table_path = self.base_path.join(&meta.filename);

            if let Ok(filter) = BloomFilter::load(
                sst::filter_path(&table_path),
                self.opts.bloom_bit_size,
                self.opts.bloom_hash_count,
            ) {
                if !filter.test(key) {
                    continue;
                }
            }

            let mut reader = SstReader::open(&table_path, self.cipher_key())?;
            if let Some(value) = reader.get(key)? {
                return Ok(value);
            }
        }
        Err(DbError::NotFound)
    }

    /// Freezes the memtable snapshot into a new SST and commits a manifest
    /// generation naming it, then resets the WAL. An empty snapshot is a
    /// no-op.
    pub fn flush(&self) -> DbResult<()> {
        let snapshot = self.memtable.snapshot();
        if snapshot.is_empty() {
            return Ok(());
        }

        let (filename, meta) = self.write_table(snapshot.iter())?;
        tracing::debug!(table = %filename, entries = snapshot.len(), "flushed memtable");

        let mut tables = (**self.tables.load()).clone();
        tables.push(meta);
        manifest::save(&self.base_path, &tables, self.cipher_key())?;
        self.tables.store(Arc::new(tables));

        self.wal.lock().reset()?;
        Ok(())
    }

    /// Merges the overlapping group seeded by the oldest live table into a
    /// single SST, commits a manifest without the inputs, then deletes
    /// them. Does nothing while the group is smaller than the configured
    /// trigger.
    pub fn compact(&self) -> DbResult<()> {
        // compact_limit is validated non-zero, an empty group never passes
        let tables = (**self.tables.load()).clone();
        let group = compaction::select_group(&tables);
        if group.len() < self.opts.compact_limit {
            return Ok(());
        }

        let merged = compaction::merge_group(&self.base_path, &group, self.cipher_key())?;
        let (filename, meta) = self.write_table(merged.iter())?;
        tracing::debug!(
            inputs = group.len(),
            table = %filename,
            entries = merged.len(),
            "compacted overlapping tables"
        );

        let replaced: HashSet<&str> = group.iter().map(|t| t.filename.as_str()).collect();
        let mut remaining: Vec<SstMeta> = tables
            .iter()
            .filter(|t| !replaced.contains(t.filename.as_str()))
            .cloned()
            .collect();
        remaining.push(meta);
        manifest::save(&self.base_path, &remaining, self.cipher_key())?;
        self.tables.store(Arc::new(remaining));

        for meta in &group {
            let table_path = self.base_path.join(&meta.filename);
            for path in [table_path.clone(), sst::filter_path(&table_path)] {
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!(file = %path.display(), error = %e, "failed to remove compacted table");
                }
            }
        }
        Ok(())
    }

    /// Sorted iterator over the current memtable snapshot.
    pub fn iterator(&self) -> DbIterator {
        DbIterator::new(self.memtable.snapshot())
    }

    /// Like [`Db::iterator`], restricted to keys starting with `prefix`.
    pub fn prefix_iterator(&self, prefix: &[u8]) -> DbIterator {
        DbIterator::with_prefix(self.memtable.snapshot(), prefix)
    }

    /// Registers a change handler; every put and delete is delivered to it
    /// on a dedicated thread, best-effort. Returns the id for
    /// [`Db::unsubscribe`].
    pub fn subscribe<F>(&self, handler: F) -> u64
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        self.subs.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        self.subs.unsubscribe(id)
    }

    /// Syncs and closes the WAL and stops the TTL sweeper. Subscriber
    /// threads are not awaited.
    pub fn close(self) -> DbResult<()> {
        self.wal.into_inner().close()?;
        Ok(())
    }

    fn cipher_key(&self) -> Option<&[u8]> {
        self.opts.encryption_key.as_deref()
    }

    // writes entries into the next free sss-NNNNN.qldb and returns its meta
    fn write_table<'a, I>(&self, entries: I) -> DbResult<(String, SstMeta)>
    where
        I: Iterator<Item = (&'a Vec<u8>, &'a Vec<u8>)>,
    {
        let id = next_sst_id(&self.base_path)?;
        let filename = format!("{SST_PREFIX}{id:05}{SST_SUFFIX}");

        let mut writer = SstWriter::create(
            self.base_path.join(&filename),
            self.cipher_key(),
            self.opts.bloom_bit_size,
            self.opts.bloom_hash_count,
        )?;
        for (key, value) in entries {
            writer.add(key, value)?;
        }
        let (min_key, max_key) = writer.finish()?;

        let meta = SstMeta {
            filename: filename.clone(),
            min_key,
            max_key,
        };
        Ok((filename, meta))
    }
}

fn next_sst_id(base: &Path) -> DbResult<u32> {
    let mut id = 0;
    for entry in fs::read_dir(base)? {
        let name = entry?.file_name().into_string().unwrap_or_default();
        if let Some(n) = name
            .strip_prefix(SST_PREFIX)
            .and_then(|s| s.strip_suffix(SST_SUFFIX))
            .and_then(|s| s.parse::<u32>().ok())
        {
            if n >= id {
                id = n + 1;
            }
        }
    }
    Ok(id)
}

// table files a crash left behind without a manifest entry are dead weight;
// CURRENT is the sole source of truth for the live set
fn collect_orphans(base: &Path, tables: &[SstMeta]) {
    let live: HashSet<&str> = tables.iter().map(|t| t.filename.as_str()).collect();

    let entries = match fs::read_dir(base) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let name = entry.file_name().into_string().unwrap_or_default();
        let is_table = name.starts_with(SST_PREFIX) && name.ends_with(SST_SUFFIX);
        if !is_table || live.contains(name.as_str()) {
            continue;
        }

        tracing::debug!(file = %name, "removing orphan table");
        let table_path = base.join(&name);
        let _ = fs::remove_file(&table_path);
        let _ = fs::remove_file(sst::filter_path(&table_path));
    }
}
