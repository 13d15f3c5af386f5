//! State and plumbing shared by both engines.

use std::sync::Arc;

use peg_access::{Pausable, RoleStore, WriterLock};
use peg_ledger::Ledger;
use peg_store::{Key, KvStore, Txn};
use peg_types::{Address, Clock, EventBus, PegError};

pub(crate) struct EngineCore {
    pub scope: String,
    pub principal: Address,
    pub reward: Arc<Ledger>,
    pub store: Arc<dyn KvStore>,
    pub roles: Arc<dyn RoleStore>,
    pub events: Arc<EventBus>,
    pub clock: Arc<dyn Clock>,
    pub pausable: Pausable,
    pub writer: WriterLock,
}

impl EngineCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scope: &str,
        principal: Address,
        reward: Arc<Ledger>,
        store: Arc<dyn KvStore>,
        roles: Arc<dyn RoleStore>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PegError> {
        if scope.is_empty() || scope.contains('/') {
            return Err(PegError::invalid(format!("invalid staking scope {scope:?}")));
        }
        if principal.is_zero() {
            return Err(PegError::invalid("staking principal must not be the zero address"));
        }
        let full_scope = format!("stake/{scope}");
        Ok(Self {
            scope: scope.to_string(),
            principal,
            reward,
            store,
            roles,
            events,
            clock,
            pausable: Pausable::new(full_scope.clone()),
            writer: WriterLock::new(full_scope),
        })
    }

    pub fn key(&self) -> Key {
        Key::new("stake").seg(&self.scope)
    }

    pub fn position_key(&self, pool: u32, account: &Address) -> Vec<u8> {
        self.key().seg("pos").dir().u32(pool).addr(account).into_vec()
    }

    pub fn pause(&self, caller: &Address) -> Result<(), PegError> {
        let _guard = self.writer.lock();
        let mut txn = Txn::new(self.store.as_ref());
        self.pausable.pause_in(&mut txn, self.roles.as_ref(), caller)?;
        txn.commit(&self.events)?;
        Ok(())
    }

    pub fn unpause(&self, caller: &Address) -> Result<(), PegError> {
        let _guard = self.writer.lock();
        let mut txn = Txn::new(self.store.as_ref());
        self.pausable.unpause_in(&mut txn, self.roles.as_ref(), caller)?;
        txn.commit(&self.events)?;
        Ok(())
    }

    pub fn is_paused(&self) -> Result<bool, PegError> {
        self.pausable.is_paused(self.store.as_ref())
    }

    /// Commit, logging the rejection if staging failed.
    pub fn finish<T>(&self, op: &'static str, txn: Txn<'_>, staged: Result<T, PegError>) -> Result<T, PegError> {
        match staged {
            Ok(out) => {
                txn.commit(&self.events)?;
                Ok(out)
            }
            Err(e) => {
                tracing::debug!(scope = %self.scope, op, error = %e, "staking operation rejected");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use peg_access::AccessRegistry;
    use peg_ledger::LedgerConfig;
    use peg_nullables::{NullClock, NullStore};
    use peg_types::{Clock, Role, Timestamp};
    use std::sync::atomic::{AtomicU64, Ordering};

    pub const ADMIN: Address = Address::from_low_u8(1);
    pub const MINTER: Address = Address::from_low_u8(3);
    pub const ENGINE: Address = Address::from_low_u8(5);
    pub const ALICE: Address = Address::from_low_u8(10);
    pub const BOB: Address = Address::from_low_u8(11);

    /// Moves one second forward on every read.
    pub struct SteppingClock(AtomicU64);

    impl SteppingClock {
        pub fn new(start: u64) -> Self {
            Self(AtomicU64::new(start))
        }

        /// The most recent time handed out.
        pub fn last(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> Timestamp {
            Timestamp::new(self.0.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    pub struct Fixture {
        pub store: Arc<NullStore>,
        pub events: Arc<EventBus>,
        pub clock: Arc<NullClock>,
        pub stake: Arc<Ledger>,
        pub reward: Arc<Ledger>,
        pub reward_roles: Arc<AccessRegistry>,
    }

    impl Fixture {
        pub fn dyn_store(&self) -> Arc<dyn KvStore> {
            self.store.clone()
        }

        pub fn engine_roles(&self, scope: &str) -> Arc<dyn RoleStore> {
            let roles = Arc::new(AccessRegistry::new(scope, self.dyn_store(), Arc::clone(&self.events)));
            roles.bootstrap(&ADMIN).unwrap();
            roles.grant_role(&ADMIN, Role::Pauser, &ADMIN).unwrap();
            roles
        }
    }

    fn ledger(symbol: &str, minter: &Address, store: &Arc<dyn KvStore>, events: &Arc<EventBus>) -> (Arc<Ledger>, Arc<AccessRegistry>) {
        let roles = Arc::new(AccessRegistry::new(symbol, Arc::clone(store), Arc::clone(events)));
        roles.bootstrap(&ADMIN).unwrap();
        roles.grant_role(&ADMIN, Role::Minter, minter).unwrap();
        let ledger = Ledger::open(LedgerConfig::open(symbol), Arc::clone(store), roles.clone(), Arc::clone(events)).unwrap();
        (Arc::new(ledger), roles)
    }

    pub fn fixture() -> Fixture {
        let store = Arc::new(NullStore::new());
        let dyn_store: Arc<dyn KvStore> = store.clone();
        let events = Arc::new(EventBus::new());
        let (stake, _) = ledger("USDT", &MINTER, &dyn_store, &events);
        let (reward, reward_roles) = ledger("USC", &ENGINE, &dyn_store, &events);
        Fixture {
            store,
            events,
            clock: Arc::new(NullClock::new(1_000)),
            stake,
            reward,
            reward_roles,
        }
    }

    #[test]
    fn scope_must_be_a_single_segment() {
        let f = fixture();
        let build = |scope: &str, principal: Address| {
            EngineCore::new(
                scope,
                principal,
                Arc::clone(&f.reward),
                f.dyn_store(),
                f.engine_roles("scratch"),
                Arc::clone(&f.events),
                f.clock.clone(),
            )
        };
        assert!(build("a/b", ENGINE).is_err());
        assert!(build("", ENGINE).is_err());
        assert!(build("farm", Address::ZERO).is_err());
        let core = build("farm", ENGINE).unwrap();
        assert_eq!(core.writer.scope(), "stake/farm");
    }
}
