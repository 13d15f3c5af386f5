//! Pluggable key-value storage for pegledger.
//!
//! Every storage backend (LMDB, in-memory for testing) implements
//! [`KvStore`]. Components never write to a backend directly: they stage
//! writes in a [`Txn`] and commit them as one [`WriteBatch`], so a failed
//! precondition anywhere in a multi-step operation leaves no trace.

pub mod error;
pub mod keys;
pub mod kv;
pub mod txn;

pub use error::StoreError;
pub use keys::Key;
pub use kv::{BatchOp, KvRead, KvStore, WriteBatch};
pub use txn::Txn;
