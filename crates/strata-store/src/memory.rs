//! In-memory reference implementation of the store contract.
//!
//! [`MemStore`] keeps the latest value per key in an ordered map guarded by
//! a read-write lock. Commits are applied under the write lock, so
//! constraint checks and insertions are atomic; snapshots clone an `Arc` of
//! the current map, so they are immutable and cheap to share. Indexing is
//! synchronous, which makes `wait_for_indexing_upto` a bounds check.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::store::{Constraint, KeyReader, KeyReaderSpec, KvEntry, Snapshot, Store, TxId};
use crate::types::{Key, Value};

type State = BTreeMap<Key, Value>;

struct Inner {
    state: Arc<State>,
    last_tx_id: TxId,
    alh: u32,
}

/// An in-memory, append-only key-value store.
///
/// Suitable for tests and for embedding the SQL core without a durable
/// backend. The full log is not retained; only the latest value per key is,
/// which is all the contract exposes to readers.
pub struct MemStore {
    inner: RwLock<Inner>,
}

impl MemStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: Arc::new(BTreeMap::new()),
                last_tx_id: 0,
                alh: 0,
            }),
        }
    }

    fn check_constraint(state: &State, entry: &KvEntry) -> StoreResult<()> {
        match entry.constraint {
            None => Ok(()),
            Some(Constraint::MustExist) => {
                if state.contains_key(&entry.key) {
                    Ok(())
                } else {
                    Err(StoreError::KeyMustExist)
                }
            }
            Some(Constraint::DeletedOrMustNotExist) => match state.get(&entry.key) {
                None => Ok(()),
                Some(v) if v.is_tombstoned() => Ok(()),
                Some(_) => Err(StoreError::KeyAlreadyExists),
            },
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemStore {
    fn get(&self, key: &[u8]) -> StoreResult<Value> {
        let inner = self.inner.read();
        inner
            .state
            .get(&Key::from_bytes(key))
            .cloned()
            .ok_or(StoreError::KeyNotFound)
    }

    fn exist_key_with(
        &self,
        prefix: &[u8],
        neq: &[u8],
        include_deleted: bool,
    ) -> StoreResult<bool> {
        let inner = self.inner.read();
        let start = Key::from_bytes(prefix);

        for (k, v) in inner.state.range(start..) {
            if !k.starts_with(prefix) {
                break;
            }
            if k.as_bytes() == neq {
                continue;
            }
            if !include_deleted && v.is_tombstoned() {
                continue;
            }
            return Ok(true);
        }

        Ok(false)
    }

    fn alh(&self) -> (TxId, [u8; 4]) {
        let inner = self.inner.read();
        (inner.last_tx_id, inner.alh.to_be_bytes())
    }

    fn wait_for_indexing_upto(&self, tx_id: TxId) -> StoreResult<()> {
        let inner = self.inner.read();
        if tx_id > inner.last_tx_id {
            return Err(StoreError::IllegalArguments("tx id beyond committed log"));
        }
        Ok(())
    }

    fn current_snapshot(&self) -> StoreResult<Box<dyn Snapshot>> {
        let inner = self.inner.read();
        Ok(Box::new(MemSnapshot {
            state: Arc::clone(&inner.state),
        }))
    }

    fn commit(&self, batch: Vec<KvEntry>) -> StoreResult<TxId> {
        if batch.is_empty() {
            return Err(StoreError::IllegalArguments("empty batch"));
        }

        let mut inner = self.inner.write();

        for entry in &batch {
            Self::check_constraint(&inner.state, entry)?;
        }

        let mut hasher = crc32fast::Hasher::new_with_initial(inner.alh);
        {
            let state = Arc::make_mut(&mut inner.state);
            for entry in batch {
                hasher.update(entry.key.as_bytes());
                hasher.update(entry.value.as_bytes());
                state.insert(entry.key, entry.value);
            }
        }

        inner.alh = hasher.finalize();
        inner.last_tx_id += 1;

        Ok(inner.last_tx_id)
    }
}

struct MemSnapshot {
    state: Arc<State>,
}

impl Snapshot for MemSnapshot {
    fn get(&self, key: &[u8]) -> StoreResult<Value> {
        self.state
            .get(&Key::from_bytes(key))
            .cloned()
            .ok_or(StoreError::KeyNotFound)
    }

    fn new_key_reader(&self, spec: KeyReaderSpec) -> StoreResult<Box<dyn KeyReader>> {
        Ok(Box::new(MemKeyReader {
            state: Arc::clone(&self.state),
            spec,
            cursor: None,
            closed: false,
        }))
    }

    fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

struct MemKeyReader {
    state: Arc<State>,
    spec: KeyReaderSpec,
    // Last key handed out; the next read resumes strictly past it.
    cursor: Option<Key>,
    closed: bool,
}

impl MemKeyReader {
    fn next_entry(&self) -> Option<(Key, Value)> {
        let prefix = &self.spec.prefix;

        if self.spec.desc_order {
            let upper: Bound<Key> = match &self.cursor {
                Some(last) => Bound::Excluded(last.clone()),
                None if self.spec.seek_key.is_empty() => {
                    Bound::Excluded(Key::from_bytes(prefix).successor())
                }
                None => Bound::Included(Key::from_vec(self.spec.seek_key.clone())),
            };

            self.state
                .range((Bound::Unbounded, upper))
                .rev()
                .take_while(|(k, _)| k.starts_with(prefix) || k.as_bytes() > prefix.as_slice())
                .find(|(k, v)| {
                    k.starts_with(prefix) && (self.spec.include_deleted || !v.is_tombstoned())
                })
                .map(|(k, v)| (k.clone(), v.clone()))
        } else {
            let lower: Bound<Key> = match &self.cursor {
                Some(last) => Bound::Excluded(last.clone()),
                None => {
                    let seek = if self.spec.seek_key.is_empty() {
                        prefix.clone()
                    } else {
                        self.spec.seek_key.clone()
                    };
                    Bound::Included(Key::from_vec(seek))
                }
            };

            self.state
                .range((lower, Bound::Unbounded))
                .take_while(|(k, _)| k.starts_with(prefix))
                .find(|(_, v)| self.spec.include_deleted || !v.is_tombstoned())
                .map(|(k, v)| (k.clone(), v.clone()))
        }
    }
}

impl KeyReader for MemKeyReader {
    fn read(&mut self) -> StoreResult<Option<(Key, Value)>> {
        if self.closed {
            return Err(StoreError::AlreadyClosed);
        }

        match self.next_entry() {
            Some((k, v)) => {
                self.cursor = Some(k.clone());
                Ok(Some((k, v)))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) -> StoreResult<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(store: &MemStore, key: &[u8], value: &[u8]) -> TxId {
        store
            .commit(vec![KvEntry::new(key.to_vec(), value.to_vec())])
            .unwrap()
    }

    #[test]
    fn test_commit_and_get() {
        let store = MemStore::new();

        assert_eq!(put(&store, b"a", b"1"), 1);
        assert_eq!(put(&store, b"b", b"2"), 2);

        assert_eq!(store.get(b"a").unwrap().as_bytes(), b"1");
        assert!(matches!(store.get(b"c"), Err(StoreError::KeyNotFound)));
    }

    #[test]
    fn test_commit_atomicity_on_constraint_violation() {
        let store = MemStore::new();
        put(&store, b"k", &[0, 1]);

        let batch = vec![
            KvEntry::new(b"x".to_vec(), b"v".to_vec()),
            KvEntry::new(b"k".to_vec(), b"v".to_vec())
                .with_constraint(Constraint::DeletedOrMustNotExist),
        ];

        assert!(matches!(
            store.commit(batch),
            Err(StoreError::KeyAlreadyExists)
        ));
        // The first entry must not have been applied.
        assert!(matches!(store.get(b"x"), Err(StoreError::KeyNotFound)));
    }

    #[test]
    fn test_deleted_or_must_not_exist_accepts_tombstone() {
        let store = MemStore::new();
        put(&store, b"k", &[1]); // tombstoned

        let batch = vec![KvEntry::new(b"k".to_vec(), vec![0, 7])
            .with_constraint(Constraint::DeletedOrMustNotExist)];
        store.commit(batch).unwrap();

        assert_eq!(store.get(b"k").unwrap().as_bytes(), &[0, 7]);
    }

    #[test]
    fn test_must_exist() {
        let store = MemStore::new();

        let batch =
            vec![KvEntry::new(b"k".to_vec(), b"v".to_vec()).with_constraint(Constraint::MustExist)];
        assert!(matches!(store.commit(batch), Err(StoreError::KeyMustExist)));

        put(&store, b"k", b"v0");
        let batch = vec![
            KvEntry::new(b"k".to_vec(), b"v1".to_vec()).with_constraint(Constraint::MustExist),
        ];
        store.commit(batch).unwrap();
    }

    #[test]
    fn test_exist_key_with() {
        let store = MemStore::new();
        put(&store, b"p.1", &[0]);
        put(&store, b"p.2", &[1]); // tombstoned

        assert!(store.exist_key_with(b"p.", b"p.", false).unwrap());
        assert!(!store.exist_key_with(b"p.", b"p.1", false).unwrap());
        assert!(store.exist_key_with(b"p.", b"p.1", true).unwrap());
        assert!(!store.exist_key_with(b"q.", b"q.", true).unwrap());
    }

    #[test]
    fn test_snapshot_isolation() {
        let store = MemStore::new();
        put(&store, b"a", &[0, 1]);

        let snap = store.current_snapshot().unwrap();
        put(&store, b"b", &[0, 2]);

        assert!(snap.get(b"a").is_ok());
        assert!(matches!(snap.get(b"b"), Err(StoreError::KeyNotFound)));
        snap.close().unwrap();
    }

    #[test]
    fn test_key_reader_ascending_descending() {
        let store = MemStore::new();
        for k in [&b"p.a"[..], b"p.b", b"p.c", b"q.a"] {
            put(&store, k, &[0]);
        }

        let snap = store.current_snapshot().unwrap();

        let mut reader = snap
            .new_key_reader(KeyReaderSpec::for_prefix(b"p.".to_vec()))
            .unwrap();
        let mut keys = Vec::new();
        while let Some((k, _)) = reader.read().unwrap() {
            keys.push(k.as_bytes().to_vec());
        }
        assert_eq!(keys, vec![b"p.a".to_vec(), b"p.b".to_vec(), b"p.c".to_vec()]);

        let mut reader = snap
            .new_key_reader(KeyReaderSpec::for_prefix(b"p.".to_vec()).with_desc_order(true))
            .unwrap();
        let mut keys = Vec::new();
        while let Some((k, _)) = reader.read().unwrap() {
            keys.push(k.as_bytes().to_vec());
        }
        assert_eq!(keys, vec![b"p.c".to_vec(), b"p.b".to_vec(), b"p.a".to_vec()]);
    }

    #[test]
    fn test_key_reader_seek_and_tombstones() {
        let store = MemStore::new();
        put(&store, b"p.a", &[0]);
        put(&store, b"p.b", &[1]); // tombstoned
        put(&store, b"p.c", &[0]);

        let snap = store.current_snapshot().unwrap();
        let mut reader = snap
            .new_key_reader(
                KeyReaderSpec::for_prefix(b"p.".to_vec()).with_seek_key(b"p.b".to_vec()),
            )
            .unwrap();

        let (k, _) = reader.read().unwrap().unwrap();
        assert_eq!(k.as_bytes(), b"p.c");
        assert!(reader.read().unwrap().is_none());

        reader.close().unwrap();
        assert!(matches!(reader.read(), Err(StoreError::AlreadyClosed)));
    }

    #[test]
    fn test_alh_advances() {
        let store = MemStore::new();
        let (tx0, h0) = store.alh();
        assert_eq!(tx0, 0);

        put(&store, b"a", b"1");
        let (tx1, h1) = store.alh();
        assert_eq!(tx1, 1);
        assert_ne!(h0, h1);

        assert!(store.wait_for_indexing_upto(1).is_ok());
        assert!(store.wait_for_indexing_upto(2).is_err());
    }
}
