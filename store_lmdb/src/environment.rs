//! LMDB environment setup and the [`KvStore`] implementation.

use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use peg_store::{BatchOp, KvStore, StoreError, WriteBatch};

use crate::LmdbError;

const STATE_DB: &str = "state";

/// Sizing parameters for the LMDB environment.
#[derive(Clone, Debug)]
pub struct LmdbConfig {
    pub map_size: usize,
    pub max_dbs: u32,
}

impl Default for LmdbConfig {
    fn default() -> Self {
        Self {
            map_size: 1024 * 1024 * 1024,
            max_dbs: 4,
        }
    }
}

/// Persistent key-value store backed by one LMDB database.
pub struct LmdbStore {
    env: Env,
    state_db: Database<Bytes, Bytes>,
    path: PathBuf,
}

impl LmdbStore {
    /// Open or create an LMDB environment in `path`.
    pub fn open(path: &Path, config: &LmdbConfig) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path).map_err(|e| LmdbError::Directory {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        // SAFETY: the environment is opened once per process per path, and
        // the data files are not modified by anything outside LMDB.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(config.map_size)
                .max_dbs(config.max_dbs)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let state_db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some(STATE_DB))?;
        wtxn.commit()?;

        tracing::info!(path = %path.display(), map_size = config.map_size, "opened LMDB store");

        Ok(Self {
            env,
            state_db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.state_db.len(&rtxn).map_err(LmdbError::from)?)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl KvStore for LmdbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let value = self
            .state_db
            .get(&rtxn, key)
            .map_err(LmdbError::from)?
            .map(|v| v.to_vec());
        Ok(value)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let iter = self
            .state_db
            .prefix_iter(&rtxn, prefix)
            .map_err(LmdbError::from)?;
        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(LmdbError::from)?;
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let ops = batch.len();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    self.state_db
                        .put(&mut wtxn, &key, &value)
                        .map_err(LmdbError::from)?;
                }
                BatchOp::Delete { key } => {
                    self.state_db
                        .delete(&mut wtxn, &key)
                        .map_err(LmdbError::from)?;
                }
            }
        }
        wtxn.commit().map_err(LmdbError::from)?;
        tracing::trace!(ops, "committed write batch");
        Ok(())
    }
}
