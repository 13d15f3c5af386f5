//! Writer locks.
//!
//! Every component serializes its mutations behind one [`WriterLock`].
//! Operations touching several components take all of their locks through
//! [`lock_all`], which sorts by scope name and skips duplicates, so two
//! operations can never wait on each other in opposite orders.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct WriterLock {
    scope: String,
    mutex: Mutex<()>,
}

impl WriterLock {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            mutex: Mutex::new(()),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// A poisoned lock only means another writer panicked before committing;
    /// its staged writes were dropped, so the store is still consistent.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Acquire every lock in global scope order. Locks sharing a scope are
/// taken once.
pub fn lock_all<'a>(locks: &[&'a WriterLock]) -> Vec<MutexGuard<'a, ()>> {
    let mut ordered: Vec<&'a WriterLock> = locks.to_vec();
    ordered.sort_by(|a, b| a.scope.cmp(&b.scope));
    ordered.dedup_by(|a, b| a.scope == b.scope);
    ordered.into_iter().map(WriterLock::lock).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn duplicates_are_locked_once() {
        let a = WriterLock::new("ledger/AGC");
        let guards = lock_all(&[&a, &a]);
        assert_eq!(guards.len(), 1);
    }

    #[test]
    fn opposite_request_orders_do_not_deadlock() {
        let a = Arc::new(WriterLock::new("ledger/AGC"));
        let b = Arc::new(WriterLock::new("ledger/USC"));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let a = Arc::clone(&a);
                let b = Arc::clone(&b);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let _guards = if i % 2 == 0 {
                            lock_all(&[&a, &b])
                        } else {
                            lock_all(&[&b, &a])
                        };
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
