//! User registry: append-only, deduplicated list of every account that
//! ever received a positive balance. The treasury is never registered.
//!
//! Stored as an arena (`users/at/<index>`) plus an index map
//! (`users/pos/<addr>`) and a length counter.

use peg_store::{KvRead, StoreError, Txn};
use peg_types::Address;

use crate::keys::LedgerKeys;

/// Append `account` unless it is already registered.
pub fn register(txn: &mut Txn<'_>, keys: &LedgerKeys, account: &Address) -> Result<(), StoreError> {
    if txn.get_raw(&keys.user_pos(account))?.is_some() {
        return Ok(());
    }
    let len = txn.get_u64(&keys.users_len())?;
    txn.put(keys.user_at(len), account.as_bytes().to_vec());
    txn.put_u64(keys.user_pos(account), len);
    txn.put_u64(keys.users_len(), len + 1);
    Ok(())
}

pub fn len<R: KvRead + ?Sized>(reader: &R, keys: &LedgerKeys) -> Result<u64, StoreError> {
    reader.get_u64(&keys.users_len())
}

pub fn at<R: KvRead + ?Sized>(reader: &R, keys: &LedgerKeys, index: u64) -> Result<Option<Address>, StoreError> {
    match reader.get_raw(&keys.user_at(index))? {
        Some(bytes) => {
            let raw: [u8; Address::LEN] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| StoreError::Corruption(format!("user entry {index} is {} bytes", bytes.len())))?;
            Ok(Some(Address::new(raw)))
        }
        None => Ok(None),
    }
}

pub fn position<R: KvRead + ?Sized>(reader: &R, keys: &LedgerKeys, account: &Address) -> Result<Option<u64>, StoreError> {
    match reader.get_raw(&keys.user_pos(account))? {
        Some(_) => Ok(Some(reader.get_u64(&keys.user_pos(account))?)),
        None => Ok(None),
    }
}
