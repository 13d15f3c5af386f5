//! Staged transactions.
//!
//! A [`Txn`] buffers writes and events on top of a [`KvStore`]. Reads see
//! the transaction's own pending writes. Nothing reaches the backend until
//! [`Txn::commit`], and events are only emitted once the batch is durable;
//! dropping a transaction discards both.

use std::collections::BTreeMap;

use peg_types::{EventBus, PegEvent};
use serde::Serialize;

use crate::{KvRead, KvStore, StoreError, WriteBatch};

pub struct Txn<'s> {
    store: &'s dyn KvStore,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    events: Vec<PegEvent>,
}

impl<'s> Txn<'s> {
    pub fn new(store: &'s dyn KvStore) -> Self {
        Self {
            store,
            writes: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn store(&self) -> &'s dyn KvStore {
        self.store
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: Vec<u8>) {
        self.writes.insert(key.into(), Some(value));
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.writes.insert(key.into(), None);
    }

    pub fn put_u128(&mut self, key: impl Into<Vec<u8>>, value: u128) {
        self.put(key, value.to_be_bytes().to_vec());
    }

    pub fn put_u64(&mut self, key: impl Into<Vec<u8>>, value: u64) {
        self.put(key, value.to_be_bytes().to_vec());
    }

    /// `false` is stored as an absent key.
    pub fn put_flag(&mut self, key: impl Into<Vec<u8>>, value: bool) {
        if value {
            self.put(key, vec![1]);
        } else {
            self.delete(key);
        }
    }

    pub fn put_record<T: Serialize>(&mut self, key: impl Into<Vec<u8>>, record: &T) -> Result<(), StoreError> {
        let bytes = bincode::serialize(record)?;
        self.put(key, bytes);
        Ok(())
    }

    /// Queue an event for emission after a successful commit.
    pub fn emit(&mut self, event: PegEvent) {
        self.events.push(event);
    }

    pub fn pending_events(&self) -> &[PegEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.events.is_empty()
    }

    /// Entries under `prefix`, merging committed state with pending writes.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self.store.scan_prefix(prefix)?.into_iter().collect();
        for (key, value) in self.writes.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    /// Write all staged changes as one batch, then emit the queued events.
    pub fn commit(self, bus: &EventBus) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        for (key, value) in self.writes {
            match value {
                Some(v) => batch.put(key, v),
                None => batch.delete(key),
            }
        }
        if !batch.is_empty() {
            self.store.commit(batch)?;
        }
        for event in &self.events {
            bus.emit(event);
        }
        Ok(())
    }
}

impl KvRead for Txn<'_> {
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        match self.writes.get(key) {
            Some(staged) => Ok(staged.clone()),
            None => self.store.get(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peg_types::Address;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MapStore {
        inner: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
        commits: Mutex<usize>,
    }

    impl KvStore for MapStore {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(self.inner.lock().unwrap().get(key).cloned())
        }

        fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
            Ok(self
                .inner
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        }

        fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
            let mut inner = self.inner.lock().unwrap();
            for op in batch.into_ops() {
                match op {
                    crate::BatchOp::Put { key, value } => {
                        inner.insert(key, value);
                    }
                    crate::BatchOp::Delete { key } => {
                        inner.remove(&key);
                    }
                }
            }
            *self.commits.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn transfer_event(amount: u128) -> PegEvent {
        PegEvent::Transfer {
            ledger: "AGC".into(),
            from: Address::ZERO,
            to: Address::from_low_u8(1),
            amount,
        }
    }

    #[test]
    fn reads_see_own_writes() {
        let store = MapStore::default();
        let mut txn = Txn::new(&store);
        assert_eq!(txn.get_u128(b"bal").unwrap(), 0);
        txn.put_u128(b"bal".to_vec(), 99);
        assert_eq!(txn.get_u128(b"bal").unwrap(), 99);
        assert_eq!(store.get_u128(b"bal").unwrap(), 0);
    }

    #[test]
    fn dropped_txn_writes_nothing() {
        let store = MapStore::default();
        {
            let mut txn = Txn::new(&store);
            txn.put_u128(b"bal".to_vec(), 5);
            txn.emit(transfer_event(5));
        }
        assert_eq!(store.get(b"bal").unwrap(), None);
        assert_eq!(*store.commits.lock().unwrap(), 0);
    }

    #[test]
    fn commit_applies_batch_then_emits() {
        let store = MapStore::default();
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(Box::new(move |e| sink.lock().unwrap().push(e.clone())));

        let mut txn = Txn::new(&store);
        txn.put_u128(b"a".to_vec(), 1);
        txn.put_flag(b"flag".to_vec(), true);
        txn.emit(transfer_event(1));
        txn.commit(&bus).unwrap();

        assert_eq!(store.get_u128(b"a").unwrap(), 1);
        assert!(store.get_flag(b"flag").unwrap());
        assert_eq!(seen.lock().unwrap().as_slice(), &[transfer_event(1)]);
        assert_eq!(*store.commits.lock().unwrap(), 1);
    }

    #[test]
    fn scan_merges_pending_writes_and_deletes() {
        let store = MapStore::default();
        let mut seed = WriteBatch::new();
        seed.put(b"p/a".to_vec(), vec![1]);
        seed.put(b"p/b".to_vec(), vec![2]);
        store.commit(seed).unwrap();

        let mut txn = Txn::new(&store);
        txn.delete(b"p/a".to_vec());
        txn.put(b"p/c".to_vec(), vec![3]);
        txn.put(b"q/z".to_vec(), vec![9]);

        let keys: Vec<Vec<u8>> = txn.scan_prefix(b"p/").unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"p/b".to_vec(), b"p/c".to_vec()]);
    }

    #[test]
    fn records_round_trip_through_bincode() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Pos {
            amount: u128,
            since: u64,
        }
        let store = MapStore::default();
        let mut txn = Txn::new(&store);
        txn.put_record(b"pos".to_vec(), &Pos { amount: 3, since: 4 }).unwrap();
        let got: Option<Pos> = txn.get_record(b"pos").unwrap();
        assert_eq!(got, Some(Pos { amount: 3, since: 4 }));
    }
}
