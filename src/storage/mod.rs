//! Scored record persistence
//!
//! Records are stored under a composite key: the partition key
//! (`{deviceId}#{YYYY-MM-DD}`) followed by the sort key (`ts`). Writes are
//! keyed puts, so delivering the same reading twice leaves one record behind.
//!
//! Backends:
//! - [`SledRecordStore`]: durable embedded store
//! - [`InMemoryRecordStore`]: tests and dry runs

mod memory;
mod record;
mod sled_store;

pub use memory::InMemoryRecordStore;
pub use record::{exact_decimal, StoredRecord};
pub use sled_store::SledRecordStore;

use serde::{Deserialize, Serialize};

use crate::types::PartitionKey;

/// Separator between the partition key and the sort key in a storage key.
///
/// Device ids never contain control characters, so the separator cannot
/// appear inside a partition key.
const KEY_SEPARATOR: u8 = 0x00;

/// Trait for pluggable record stores.
///
/// Implementations must be safe to share across concurrently processed
/// records. A single `put` is atomic: the record is either fully stored or
/// not stored at all.
pub trait RecordStore: Send + Sync {
    /// Store a record under `(pk, ts)`.
    fn put(&self, record: &StoredRecord) -> Result<WriteOutcome, StoreError>;

    /// Fetch one record by its full key.
    fn get(&self, pk: &PartitionKey, ts: i64) -> Result<Option<StoredRecord>, StoreError>;

    /// All records of one partition, ordered by timestamp.
    fn query_partition(&self, pk: &PartitionKey) -> Result<Vec<StoredRecord>, StoreError>;

    /// Total number of stored records.
    fn count(&self) -> Result<usize, StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// What a `put` did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    /// No record existed under this key
    Created,
    /// An identical record was already stored
    Unchanged,
    /// A record with different attributes was replaced (last write wins)
    Replaced,
}

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("field '{field}' value {value} has no exact decimal representation")]
    NotRepresentable { field: &'static str, value: f64 },
}

impl StoreError {
    /// Whether the record itself was refused, as opposed to the store failing.
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::NotRepresentable { .. })
    }
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Byte prefix shared by every key of a partition.
pub(crate) fn partition_prefix(pk: &PartitionKey) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(pk.as_str().len() + 1);
    prefix.extend_from_slice(pk.as_str().as_bytes());
    prefix.push(KEY_SEPARATOR);
    prefix
}

/// Full storage key for `(pk, ts)`.
///
/// The timestamp is big-endian with its sign bit flipped so that byte order
/// equals numeric order, including for timestamps before 1970.
pub(crate) fn storage_key(pk: &PartitionKey, ts: i64) -> Vec<u8> {
    let mut key = partition_prefix(pk);
    key.extend_from_slice(&encode_sort_key(ts));
    key
}

const fn encode_sort_key(ts: i64) -> [u8; 8] {
    ((ts as u64) ^ (1 << 63)).to_be_bytes()
}

/// Classify a put from the previously stored bytes.
pub(crate) fn classify_write(previous: Option<&[u8]>, current: &[u8]) -> WriteOutcome {
    match previous {
        None => WriteOutcome::Created,
        Some(prev) if prev == current => WriteOutcome::Unchanged,
        Some(_) => WriteOutcome::Replaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pk(s: &str) -> PartitionKey {
        PartitionKey::for_timestamp(s, 1_690_000_000_000).unwrap()
    }

    #[test]
    fn test_sort_key_byte_order_matches_numeric_order() {
        let samples = [i64::MIN, -1_000, -1, 0, 1, 1_690_000_000_000, i64::MAX];
        for pair in samples.windows(2) {
            assert!(encode_sort_key(pair[0]) < encode_sort_key(pair[1]));
        }
    }

    #[test]
    fn test_storage_key_starts_with_partition_prefix() {
        let key = storage_key(&pk("dev-1"), 42);
        assert!(key.starts_with(&partition_prefix(&pk("dev-1"))));
        assert_eq!(key.len(), "dev-1#2023-07-22".len() + 1 + 8);
    }

    #[test]
    fn test_prefix_of_one_device_excludes_longer_ids() {
        // "dev-1#..." must not prefix-match "dev-10#..."
        let short = partition_prefix(&pk("dev-1"));
        let long_key = storage_key(&pk("dev-10"), 0);
        assert!(!long_key.starts_with(&short));
    }

    #[test]
    fn test_classify_write() {
        assert_eq!(classify_write(None, b"a"), WriteOutcome::Created);
        assert_eq!(classify_write(Some(b"a"), b"a"), WriteOutcome::Unchanged);
        assert_eq!(classify_write(Some(b"a"), b"b"), WriteOutcome::Replaced);
    }
}
