//! Pause state machine: `Active -> Paused -> Active`, starting `Active`.

use peg_store::{Key, KvRead, Txn};
use peg_types::{Address, PegError, PegEvent, Role};

use crate::RoleStore;

/// Persistent pause flag for one component scope.
#[derive(Clone, Debug)]
pub struct Pausable {
    scope: String,
    key: Vec<u8>,
}

impl Pausable {
    pub fn new(scope: impl Into<String>) -> Self {
        let scope = scope.into();
        let key = Key::new(&scope).seg("paused").into_vec();
        Self { scope, key }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn is_paused<R: KvRead + ?Sized>(&self, reader: &R) -> Result<bool, PegError> {
        Ok(reader.get_flag(&self.key)?)
    }

    /// Fail with `Paused` while the scope is paused.
    pub fn ensure_not_paused<R: KvRead + ?Sized>(&self, reader: &R) -> Result<(), PegError> {
        if self.is_paused(reader)? {
            tracing::debug!(scope = %self.scope, "rejected: paused");
            return Err(PegError::Paused {
                scope: self.scope.clone(),
            });
        }
        Ok(())
    }

    /// Stage `Active -> Paused`. Requires `PAUSER`.
    pub fn pause_in(&self, txn: &mut Txn<'_>, roles: &dyn RoleStore, caller: &Address) -> Result<(), PegError> {
        self.ensure_not_paused(&*txn)?;
        roles.ensure_role(Role::Pauser, caller)?;
        txn.put_flag(self.key.clone(), true);
        txn.emit(PegEvent::Paused {
            scope: self.scope.clone(),
            by: *caller,
        });
        tracing::warn!(scope = %self.scope, by = %caller, "paused");
        Ok(())
    }

    /// Stage `Paused -> Active`. Requires `PAUSER`.
    pub fn unpause_in(&self, txn: &mut Txn<'_>, roles: &dyn RoleStore, caller: &Address) -> Result<(), PegError> {
        if !self.is_paused(&*txn)? {
            return Err(PegError::NotPaused {
                scope: self.scope.clone(),
            });
        }
        roles.ensure_role(Role::Pauser, caller)?;
        txn.put_flag(self.key.clone(), false);
        txn.emit(PegEvent::Unpaused {
            scope: self.scope.clone(),
            by: *caller,
        });
        tracing::warn!(scope = %self.scope, by = %caller, "unpaused");
        Ok(())
    }
}
