//! Sled-backed record store
//!
//! One sled tree (`scored_records`) holds every record. Keys are
//! `pk ‖ 0x00 ‖ ts` (see [`storage_key`](super::storage_key)), so the records
//! of one device-day are contiguous and already sorted by timestamp.

use std::path::Path;
use std::sync::Arc;

use super::{classify_write, partition_prefix, storage_key, RecordStore, StoreError, StoredRecord, WriteOutcome};
use crate::types::PartitionKey;

const TREE_NAME: &str = "scored_records";

/// Durable record store on an embedded sled database
#[derive(Clone)]
pub struct SledRecordStore {
    db: Arc<sled::Db>,
    tree: sled::Tree,
    flush_every_write: bool,
}

impl SledRecordStore {
    /// Open or create the store at `path`.
    ///
    /// With `flush_every_write`, each put is flushed before it is reported as
    /// persisted; otherwise sled's background flush applies.
    pub fn open<P: AsRef<Path>>(path: P, flush_every_write: bool) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        let tree = db.open_tree(TREE_NAME)?;

        tracing::info!(
            path = %path.display(),
            records = tree.len(),
            flush_every_write,
            "Record store opened"
        );

        Ok(Self {
            db: Arc::new(db),
            tree,
            flush_every_write,
        })
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Get database size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }
}

impl RecordStore for SledRecordStore {
    fn put(&self, record: &StoredRecord) -> Result<WriteOutcome, StoreError> {
        let key = storage_key(&record.pk, record.ts);
        let value = serde_json::to_vec(record)?;

        let previous = self.tree.insert(key, value.as_slice())?;
        let outcome = classify_write(previous.as_deref(), &value);

        if self.flush_every_write {
            self.tree.flush()?;
        }

        tracing::debug!(pk = %record.pk, ts = record.ts, ?outcome, "Record written");
        Ok(outcome)
    }

    fn get(&self, pk: &PartitionKey, ts: i64) -> Result<Option<StoredRecord>, StoreError> {
        match self.tree.get(storage_key(pk, ts))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn query_partition(&self, pk: &PartitionKey) -> Result<Vec<StoredRecord>, StoreError> {
        let mut records = Vec::new();
        for item in self.tree.scan_prefix(partition_prefix(pk)) {
            let (_key, value) = item?;
            match serde_json::from_slice::<StoredRecord>(&value) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(pk = %pk, error = %e, "Skipping undecodable stored record");
                }
            }
        }
        Ok(records)
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.tree.len())
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}
