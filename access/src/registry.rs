//! Role registry.

use std::sync::Arc;

use peg_store::{Key, KvRead, KvStore, Txn};
use peg_types::{Address, EventBus, PegError, PegEvent, Role};

use crate::WriterLock;

/// Role checks consumed by every gated component.
pub trait RoleStore: Send + Sync {
    /// Name of the component scope this role table belongs to.
    fn scope(&self) -> &str;

    fn has_role(&self, role: Role, principal: &Address) -> Result<bool, PegError>;

    /// Fail with `Unauthorized` unless `principal` holds `role`.
    fn ensure_role(&self, role: Role, principal: &Address) -> Result<(), PegError> {
        if self.has_role(role, principal)? {
            Ok(())
        } else {
            tracing::debug!(scope = self.scope(), %principal, %role, "role check failed");
            Err(PegError::Unauthorized {
                principal: *principal,
                role,
            })
        }
    }
}

/// KV-backed role table for one component scope.
///
/// `ADMIN` administers every role unless [`AccessRegistry::set_role_admin`]
/// says otherwise.
pub struct AccessRegistry {
    scope: String,
    store: Arc<dyn KvStore>,
    events: Arc<EventBus>,
    writer: WriterLock,
}

impl AccessRegistry {
    pub fn new(scope: impl Into<String>, store: Arc<dyn KvStore>, events: Arc<EventBus>) -> Self {
        let scope = scope.into();
        let writer = WriterLock::new(format!("acl/{scope}"));
        Self {
            scope,
            store,
            events,
            writer,
        }
    }

    /// Grant `ADMIN` to `admin` the first time this scope is opened.
    /// Returns whether a grant happened. The bootstrap is recorded, so a
    /// scope whose admins all renounced stays without one.
    pub fn bootstrap(&self, admin: &Address) -> Result<bool, PegError> {
        if admin.is_zero() {
            return Err(PegError::invalid("bootstrap: admin must not be the zero address"));
        }
        let _guard = self.writer.lock();
        let marker = bootstrapped_key(&self.scope);
        if self.store.get_flag(marker.as_bytes())? || !self.members(Role::Admin)?.is_empty() {
            return Ok(false);
        }
        let mut txn = Txn::new(self.store.as_ref());
        txn.put_flag(marker, true);
        self.stage_grant(&mut txn, Role::Admin, admin, admin);
        txn.commit(&self.events)?;
        tracing::info!(scope = %self.scope, %admin, "role registry bootstrapped");
        Ok(true)
    }

    pub fn grant_role(&self, caller: &Address, role: Role, account: &Address) -> Result<(), PegError> {
        let _guard = self.writer.lock();
        self.ensure_role(self.role_admin(role)?, caller)?;
        if account.is_zero() {
            return Err(PegError::invalid("grantRole: cannot grant to the zero address"));
        }
        if self.has_role(role, account)? {
            return Ok(());
        }
        let mut txn = Txn::new(self.store.as_ref());
        self.stage_grant(&mut txn, role, account, caller);
        txn.commit(&self.events)?;
        tracing::info!(scope = %self.scope, %role, %account, sender = %caller, "role granted");
        Ok(())
    }

    pub fn revoke_role(&self, caller: &Address, role: Role, account: &Address) -> Result<(), PegError> {
        let _guard = self.writer.lock();
        self.ensure_role(self.role_admin(role)?, caller)?;
        self.remove(role, account, caller)
    }

    /// Give up a role held by the caller itself.
    pub fn renounce_role(&self, caller: &Address, role: Role, account: &Address) -> Result<(), PegError> {
        if caller != account {
            return Err(PegError::Forbidden("can only renounce roles for self".into()));
        }
        let _guard = self.writer.lock();
        self.remove(role, account, caller)
    }

    pub fn role_admin(&self, role: Role) -> Result<Role, PegError> {
        let bytes = self.store.get_raw(admin_key(&self.scope, role).as_bytes())?;
        match bytes.as_deref() {
            None => Ok(Role::Admin),
            Some([code]) => Role::from_code(*code)
                .ok_or_else(|| PegError::Storage(format!("unknown role code {code} in {}", self.scope))),
            Some(other) => Err(PegError::Storage(format!(
                "role admin record has {} bytes, expected 1",
                other.len()
            ))),
        }
    }

    pub fn set_role_admin(&self, caller: &Address, role: Role, admin_role: Role) -> Result<(), PegError> {
        let _guard = self.writer.lock();
        self.ensure_role(Role::Admin, caller)?;
        let mut txn = Txn::new(self.store.as_ref());
        txn.put(admin_key(&self.scope, role), vec![admin_role.code()]);
        txn.commit(&self.events)?;
        tracing::info!(scope = %self.scope, %role, %admin_role, "role admin changed");
        Ok(())
    }

    /// Every principal currently holding `role`, in key order.
    pub fn members(&self, role: Role) -> Result<Vec<Address>, PegError> {
        let prefix = members_prefix(&self.scope, role);
        let entries = self.store.scan_prefix(prefix.as_bytes())?;
        entries
            .into_iter()
            .map(|(key, _)| {
                let suffix: [u8; Address::LEN] = key[prefix.as_bytes().len()..]
                    .try_into()
                    .map_err(|_| PegError::Storage("malformed role assignment key".into()))?;
                Ok(Address::new(suffix))
            })
            .collect()
    }

    fn stage_grant(&self, txn: &mut Txn<'_>, role: Role, account: &Address, sender: &Address) {
        txn.put_flag(member_key(&self.scope, role, account), true);
        txn.emit(PegEvent::RoleGranted {
            scope: self.scope.clone(),
            role,
            account: *account,
            sender: *sender,
        });
    }

    fn remove(&self, role: Role, account: &Address, sender: &Address) -> Result<(), PegError> {
        if !self.has_role(role, account)? {
            return Ok(());
        }
        let mut txn = Txn::new(self.store.as_ref());
        txn.put_flag(member_key(&self.scope, role, account), false);
        txn.emit(PegEvent::RoleRevoked {
            scope: self.scope.clone(),
            role,
            account: *account,
            sender: *sender,
        });
        txn.commit(&self.events)?;
        tracing::info!(scope = %self.scope, %role, %account, %sender, "role revoked");
        Ok(())
    }
}

impl RoleStore for AccessRegistry {
    fn scope(&self) -> &str {
        &self.scope
    }

    fn has_role(&self, role: Role, principal: &Address) -> Result<bool, PegError> {
        Ok(self
            .store
            .get_flag(member_key(&self.scope, role, principal).as_bytes())?)
    }
}

fn members_prefix(scope: &str, role: Role) -> Key {
    Key::new("acl").seg(scope).seg("m").seg(role.as_str()).dir()
}

fn member_key(scope: &str, role: Role, account: &Address) -> Key {
    members_prefix(scope, role).addr(account)
}

fn bootstrapped_key(scope: &str) -> Key {
    Key::new("acl").seg(scope).seg("bootstrapped")
}

fn admin_key(scope: &str, role: Role) -> Key {
    Key::new("acl").seg(scope).seg("admin").seg(role.as_str())
}
