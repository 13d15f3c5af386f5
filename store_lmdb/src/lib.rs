//! LMDB storage backend for pegledger.
//!
//! Implements [`peg_store::KvStore`] on top of a single `heed` database.
//! Each [`peg_store::WriteBatch`] is applied inside one LMDB write
//! transaction, so a commit is all-or-nothing and costs one fsync.

pub mod environment;
pub mod error;

pub use environment::{LmdbConfig, LmdbStore};
pub use error::LmdbError;
