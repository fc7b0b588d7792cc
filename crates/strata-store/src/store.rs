//! The store contract consumed by the SQL core.
//!
//! A [`Store`] is an append-only, totally ordered key-value log with an
//! asynchronous indexer: writes become visible to readers once indexing has
//! caught up with the commit that produced them. Reads happen against
//! immutable [`Snapshot`]s; range iteration is served by [`KeyReader`]s
//! opened on a snapshot.

use crate::error::StoreResult;
use crate::types::{Key, Value};

/// Identifier of a committed transaction, assigned in commit order.
pub type TxId = u64;

/// Write-time constraint attached to a single entry of a commit batch.
///
/// Constraints are checked atomically against the committed state at commit
/// time; a single violation fails the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// The key must already exist in the store.
    MustExist,
    /// The key must be absent, or present with a tombstoned value
    /// (first value byte `1`). A live value under the key fails the batch
    /// with `KeyAlreadyExists`.
    DeletedOrMustNotExist,
}

/// A single entry of a commit batch.
#[derive(Debug, Clone)]
pub struct KvEntry {
    /// Entry key.
    pub key: Key,
    /// Entry value.
    pub value: Value,
    /// Optional write-time constraint.
    pub constraint: Option<Constraint>,
}

impl KvEntry {
    /// Creates an unconstrained entry.
    #[must_use]
    pub fn new(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            constraint: None,
        }
    }

    /// Attaches a constraint to this entry.
    #[must_use]
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }
}

/// Specification of a key-range iteration.
#[derive(Debug, Clone)]
pub struct KeyReaderSpec {
    /// Only keys with this prefix are visited.
    pub prefix: Vec<u8>,
    /// Starting position. Ascending readers begin at the smallest key
    /// `>= seek_key`; descending readers begin at the largest key
    /// `<= seek_key`. An empty seek key means "start of prefix" ascending
    /// and "end of prefix" descending.
    pub seek_key: Vec<u8>,
    /// Iterate in descending key order.
    pub desc_order: bool,
    /// Visit entries whose value carries the tombstone marker.
    pub include_deleted: bool,
}

impl KeyReaderSpec {
    /// Creates an ascending spec covering all keys under `prefix`.
    #[must_use]
    pub fn for_prefix(prefix: Vec<u8>) -> Self {
        Self {
            prefix,
            seek_key: Vec::new(),
            desc_order: false,
            include_deleted: false,
        }
    }

    /// Sets the starting key.
    #[must_use]
    pub fn with_seek_key(mut self, seek_key: Vec<u8>) -> Self {
        self.seek_key = seek_key;
        self
    }

    /// Sets descending iteration order.
    #[must_use]
    pub fn with_desc_order(mut self, desc: bool) -> Self {
        self.desc_order = desc;
        self
    }

    /// Includes tombstoned entries in the iteration.
    #[must_use]
    pub fn with_include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }
}

/// An iterator over a key range of a snapshot.
pub trait KeyReader {
    /// Returns the next entry, or `None` when the range is exhausted.
    fn read(&mut self) -> StoreResult<Option<(Key, Value)>>;

    /// Releases the reader. Idempotent.
    fn close(&mut self) -> StoreResult<()>;
}

/// An immutable view of the store at a point in the commit order.
pub trait Snapshot: Send + Sync {
    /// Point lookup within the snapshot.
    fn get(&self, key: &[u8]) -> StoreResult<Value>;

    /// Opens a range iterator over the snapshot.
    fn new_key_reader(&self, spec: KeyReaderSpec) -> StoreResult<Box<dyn KeyReader>>;

    /// Releases the snapshot. Idempotent.
    fn close(&self) -> StoreResult<()>;
}

/// The append-only key-value store.
pub trait Store: Send + Sync {
    /// Point lookup against the latest indexed state.
    fn get(&self, key: &[u8]) -> StoreResult<Value>;

    /// Returns true if any key with the given prefix, other than `neq`,
    /// exists. Tombstoned entries are skipped unless `include_deleted`.
    fn exist_key_with(&self, prefix: &[u8], neq: &[u8], include_deleted: bool)
        -> StoreResult<bool>;

    /// Returns the id of the last committed transaction and the accumulated
    /// log hash up to it.
    fn alh(&self) -> (TxId, [u8; 4]);

    /// Blocks until the indexer has processed commits up to `tx_id`.
    fn wait_for_indexing_upto(&self, tx_id: TxId) -> StoreResult<()>;

    /// Pins a snapshot of the latest indexed state.
    fn current_snapshot(&self) -> StoreResult<Box<dyn Snapshot>>;

    /// Atomically commits a batch of entries, checking constraints first.
    ///
    /// Either every entry is applied or none is. Returns the id of the new
    /// transaction.
    fn commit(&self, batch: Vec<KvEntry>) -> StoreResult<TxId>;
}
