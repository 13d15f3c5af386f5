//! Key-value storage trait and typed reads.

use serde::de::DeserializeOwned;

use crate::StoreError;

/// A single staged mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// An ordered set of mutations applied atomically by [`KvStore::commit`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put { key, value });
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete { key });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Trait every storage backend implements.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Apply every operation in `batch` or none of them.
    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// Typed reads shared by backends and staged transactions.
///
/// Missing integers read as zero and missing flags as `false`, which is the
/// initial value of every counter and balance in the system.
pub trait KvRead {
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn get_u128(&self, key: &[u8]) -> Result<u128, StoreError> {
        match self.get_raw(key)? {
            Some(bytes) => decode_u128(&bytes),
            None => Ok(0),
        }
    }

    fn get_u64(&self, key: &[u8]) -> Result<u64, StoreError> {
        match self.get_raw(key)? {
            Some(bytes) => decode_u64(&bytes),
            None => Ok(0),
        }
    }

    fn get_flag(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(matches!(self.get_raw(key)?.as_deref(), Some([1])))
    }

    fn get_record<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StoreError> {
        match self.get_raw(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl<T: KvStore + ?Sized> KvRead for T {
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.get(key)
    }
}

pub(crate) fn decode_u128(bytes: &[u8]) -> Result<u128, StoreError> {
    let arr: [u8; 16] = bytes
        .try_into()
        .map_err(|_| StoreError::Corruption(format!("expected 16-byte integer, got {}", bytes.len())))?;
    Ok(u128::from_be_bytes(arr))
}

pub(crate) fn decode_u64(bytes: &[u8]) -> Result<u64, StoreError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Corruption(format!("expected 8-byte integer, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_keeps_operation_order() {
        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.delete(b"a".to_vec());
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.ops()[1], BatchOp::Delete { key: b"a".to_vec() });
    }

    #[test]
    fn integer_decoding_rejects_bad_width() {
        assert_eq!(decode_u128(&7u128.to_be_bytes()).unwrap(), 7);
        assert!(matches!(decode_u128(&[1, 2, 3]), Err(StoreError::Corruption(_))));
        assert!(matches!(decode_u64(&[0; 16]), Err(StoreError::Corruption(_))));
    }
}
