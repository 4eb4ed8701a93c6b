//! In-memory record store
//!
//! Same key layout and write semantics as the sled store. Not durable; data is
//! lost on restart.

use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{classify_write, partition_prefix, storage_key, RecordStore, StoreError, StoredRecord, WriteOutcome};
use crate::types::PartitionKey;

/// In-memory persistence for tests and dry runs
#[derive(Default)]
pub struct InMemoryRecordStore {
    // Values are the serialized record so write classification matches sled.
    records: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn put(&self, record: &StoredRecord) -> Result<WriteOutcome, StoreError> {
        let value = serde_json::to_vec(record)?;
        let mut records = self
            .records
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let previous = records.insert(storage_key(&record.pk, record.ts), value.clone());
        Ok(classify_write(previous.as_deref(), &value))
    }

    fn get(&self, pk: &PartitionKey, ts: i64) -> Result<Option<StoredRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        records
            .get(&storage_key(pk, ts))
            .map(|bytes| serde_json::from_slice(bytes))
            .transpose()
            .map_err(StoreError::from)
    }

    fn query_partition(&self, pk: &PartitionKey) -> Result<Vec<StoredRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let prefix = partition_prefix(pk);
        records
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(_, bytes)| serde_json::from_slice(bytes).map_err(StoreError::from))
            .collect()
    }

    fn count(&self) -> Result<usize, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(records.len())
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}
