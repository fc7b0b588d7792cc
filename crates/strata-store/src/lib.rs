//! # strata-store
//!
//! The key-value substrate contract for StrataDB.
//!
//! StrataDB's SQL core talks to its backing store exclusively through the
//! traits in this crate. The store is append-only: committed entries are
//! never overwritten in place, and logical deletion is expressed by writing
//! new entries whose payload carries a tombstone marker interpreted by the
//! layers above.
//!
//! This crate provides:
//!
//! - **Types**: [`Key`] and [`Value`], cheap byte-sequence wrappers
//! - **Contract**: [`Store`], [`Snapshot`], and [`KeyReader`] traits plus
//!   write-time [`Constraint`]s
//! - **Reference store**: [`MemStore`], an in-memory implementation of the
//!   full contract used by tests and embedders
//!
//! ## Example
//!
//! ```rust
//! use strata_store::{Constraint, KvEntry, MemStore, Store};
//!
//! let store = MemStore::new();
//! let tx_id = store
//!     .commit(vec![KvEntry::new(b"k1".to_vec(), b"v1".to_vec())])
//!     .unwrap();
//! assert_eq!(tx_id, 1);
//! assert_eq!(store.get(b"k1").unwrap().as_bytes(), b"v1");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use memory::MemStore;
pub use store::{Constraint, KeyReader, KeyReaderSpec, KvEntry, Snapshot, Store, TxId};
pub use types::{Key, Value};
