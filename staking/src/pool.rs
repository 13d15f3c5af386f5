//! Weighted multi-pool staking.
//!
//! A global `reward_per_second` is split across pools by `alloc_weight`.
//! Each pool keeps an accumulated reward per staked unit, scaled by
//! [`PRECISION`]; a position owes `amount * acc / PRECISION - reward_debt`.
//! Pools are advanced to the current time before any stake or rate change.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use peg_access::{lock_all, RoleStore, WriterLock};
use peg_ledger::Ledger;
use peg_store::{KvRead, KvStore, Txn};
use peg_types::{Address, Amount, Clock, EventBus, PegError, PegEvent, Role, Timestamp};
use peg_utils::format_duration;

use crate::core::EngineCore;
use crate::{PoolId, StakingEngine};

/// Fixed-point scale of `acc_reward_per_share`.
pub const PRECISION: u128 = 1_000_000_000_000;

#[derive(Clone, Debug)]
pub struct PoolStakingConfig {
    pub scope: String,
    pub principal: Address,
    /// Reward units minted per second across all pools. Only written the
    /// first time the scope is opened.
    pub reward_per_second: Amount,
    /// Park owed rewards in `unclaimed` instead of paying them when a
    /// withdrawal happens inside the lockup window.
    pub lock_withdraw_rewards: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    /// Symbol of the ledger whose tokens are staked in this pool.
    pub stake_token: String,
    pub alloc_weight: u64,
    pub lockup_secs: u64,
    pub last_reward_at: u64,
    pub acc_reward_per_share: u128,
    pub total_staked: Amount,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolPosition {
    pub amount: Amount,
    pub reward_debt: Amount,
    /// Reward earned but not yet paid out.
    pub unclaimed: Amount,
    /// Time of the most recent deposit.
    pub deposit_at: u64,
}

impl PoolInfo {
    /// Bring the accumulator up to `now`.
    fn advance(&mut self, now: u64, reward_per_second: Amount, total_weight: u64) -> Result<(), PegError> {
        if now <= self.last_reward_at {
            return Ok(());
        }
        if self.total_staked == 0 || total_weight == 0 || self.alloc_weight == 0 {
            self.last_reward_at = now;
            return Ok(());
        }
        let elapsed = u128::from(now - self.last_reward_at);
        let reward = elapsed
            .checked_mul(reward_per_second)
            .and_then(|v| v.checked_mul(u128::from(self.alloc_weight)))
            .map(|v| v / u128::from(total_weight))
            .ok_or_else(|| PegError::overflow("pool reward"))?;
        let per_share = reward
            .checked_mul(PRECISION)
            .map(|v| v / self.total_staked)
            .ok_or_else(|| PegError::overflow("pool reward per share"))?;
        self.acc_reward_per_share = self
            .acc_reward_per_share
            .checked_add(per_share)
            .ok_or_else(|| PegError::overflow("pool reward per share"))?;
        self.last_reward_at = now;
        Ok(())
    }

    fn accumulated(&self, amount: Amount) -> Result<Amount, PegError> {
        amount
            .checked_mul(self.acc_reward_per_share)
            .map(|v| v / PRECISION)
            .ok_or_else(|| PegError::overflow("position reward"))
    }

    /// Reward the position has earned since its debt was last reset.
    fn owed(&self, position: &PoolPosition) -> Result<Amount, PegError> {
        Ok(self.accumulated(position.amount)?.saturating_sub(position.reward_debt))
    }

    fn unlocks_at(&self, position: &PoolPosition) -> u64 {
        position.deposit_at.saturating_add(self.lockup_secs)
    }
}

pub struct PoolStaking {
    core: EngineCore,
    lock_withdraw_rewards: bool,
    stake_tokens: HashMap<String, Arc<Ledger>>,
    rps_key: Vec<u8>,
    weight_key: Vec<u8>,
    count_key: Vec<u8>,
}

impl PoolStaking {
    /// `stake_tokens` lists every ledger a pool may stake. The principal
    /// needs `MINTER` on `reward`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PoolStakingConfig,
        stake_tokens: Vec<Arc<Ledger>>,
        reward: Arc<Ledger>,
        store: Arc<dyn KvStore>,
        roles: Arc<dyn RoleStore>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PegError> {
        let core = EngineCore::new(&config.scope, config.principal, reward, store, roles, events, clock)?;
        let engine = Self {
            rps_key: core.key().seg("rps").into_vec(),
            weight_key: core.key().seg("weight").into_vec(),
            count_key: core.key().seg("pools").into_vec(),
            core,
            lock_withdraw_rewards: config.lock_withdraw_rewards,
            stake_tokens: stake_tokens
                .into_iter()
                .map(|ledger| (ledger.symbol().to_string(), ledger))
                .collect(),
        };
        if engine.core.store.get_raw(&engine.rps_key)?.is_none() {
            let mut txn = Txn::new(engine.core.store.as_ref());
            txn.put_u128(engine.rps_key.clone(), config.reward_per_second);
            txn.commit(&engine.core.events)?;
        }
        Ok(engine)
    }

    pub fn principal(&self) -> Address {
        self.core.principal
    }

    pub fn lock_withdraw_rewards(&self) -> bool {
        self.lock_withdraw_rewards
    }

    pub fn reward_per_second(&self) -> Result<Amount, PegError> {
        Ok(self.core.store.get_u128(&self.rps_key)?)
    }

    pub fn total_weight(&self) -> Result<u64, PegError> {
        Ok(self.core.store.get_u64(&self.weight_key)?)
    }

    pub fn pool_count(&self) -> Result<u32, PegError> {
        let count = self.core.store.get_u64(&self.count_key)?;
        u32::try_from(count).map_err(|_| PegError::Storage(format!("pool count {count} out of range")))
    }

    pub fn pool(&self, pool: PoolId) -> Result<PoolInfo, PegError> {
        self.load_pool(self.core.store.as_ref(), pool)
    }

    pub fn position(&self, account: &Address, pool: PoolId) -> Result<PoolPosition, PegError> {
        Ok(self
            .core
            .store
            .get_record(&self.core.position_key(pool, account))?
            .unwrap_or_default())
    }

    /// False until the pool's lockup has elapsed since `account`'s most
    /// recent deposit.
    pub fn can_claim_rewards(&self, account: &Address, pool: PoolId, now: Timestamp) -> Result<bool, PegError> {
        let info = self.pool(pool)?;
        Ok(now.as_secs() >= info.unlocks_at(&self.position(account, pool)?))
    }

    /// Register a pool staking `stake_token`. Requires `ADMIN`.
    pub fn add_pool(
        &self,
        caller: &Address,
        stake_token: &str,
        alloc_weight: u64,
        lockup_secs: u64,
    ) -> Result<PoolId, PegError> {
        let _guard = self.core.writer.lock();
        let now = self.core.clock.now();
        let mut txn = Txn::new(self.core.store.as_ref());
        let staged = self.add_pool_in(&mut txn, caller, stake_token, alloc_weight, lockup_secs, now);
        let pool = self.core.finish("add_pool", txn, staged)?;
        tracing::info!(scope = %self.core.scope, pool, stake_token, alloc_weight, lockup_secs, "pool added");
        Ok(pool)
    }

    /// Change a pool's share of the global rate. Requires `ADMIN`.
    pub fn set_pool_weight(&self, caller: &Address, pool: PoolId, alloc_weight: u64) -> Result<(), PegError> {
        let _guard = self.core.writer.lock();
        let now = self.core.clock.now();
        let mut txn = Txn::new(self.core.store.as_ref());
        let staged = self.set_pool_weight_in(&mut txn, caller, pool, alloc_weight, now);
        self.core.finish("set_pool_weight", txn, staged)?;
        tracing::info!(scope = %self.core.scope, pool, alloc_weight, "pool weight updated");
        Ok(())
    }

    /// Requires `ADMIN`.
    pub fn set_reward_per_second(&self, caller: &Address, reward_per_second: Amount) -> Result<(), PegError> {
        let _guard = self.core.writer.lock();
        let now = self.core.clock.now();
        let mut txn = Txn::new(self.core.store.as_ref());
        let staged = self.set_reward_per_second_in(&mut txn, caller, reward_per_second, now);
        self.core.finish("set_reward_per_second", txn, staged)?;
        tracing::info!(scope = %self.core.scope, reward_per_second, "reward rate updated");
        Ok(())
    }

    fn set_reward_per_second_in(
        &self,
        txn: &mut Txn<'_>,
        caller: &Address,
        reward_per_second: Amount,
        now: Timestamp,
    ) -> Result<(), PegError> {
        self.core.roles.ensure_role(Role::Admin, caller)?;
        self.advance_all(txn, now)?;
        txn.put_u128(self.rps_key.clone(), reward_per_second);
        Ok(())
    }

    fn load_pool<R: KvRead + ?Sized>(&self, reader: &R, pool: PoolId) -> Result<PoolInfo, PegError> {
        reader
            .get_record(&self.pool_key(pool))?
            .ok_or_else(|| PegError::invalid(format!("unknown pool {pool}")))
    }

    fn pool_key(&self, pool: PoolId) -> Vec<u8> {
        self.core.key().seg("pool").dir().u32(pool).into_vec()
    }

    fn stake_token(&self, info: &PoolInfo) -> Result<&Arc<Ledger>, PegError> {
        self.stake_tokens
            .get(&info.stake_token)
            .ok_or_else(|| PegError::invalid(format!("stake token {} is not registered", info.stake_token)))
    }

    /// Load `pool` advanced to `now`.
    fn advanced_pool(&self, txn: &Txn<'_>, pool: PoolId, now: Timestamp) -> Result<PoolInfo, PegError> {
        let mut info = self.load_pool(txn, pool)?;
        info.advance(now.as_secs(), txn.get_u128(&self.rps_key)?, txn.get_u64(&self.weight_key)?)?;
        Ok(info)
    }

    fn advance_all(&self, txn: &mut Txn<'_>, now: Timestamp) -> Result<(), PegError> {
        let count = txn.get_u64(&self.count_key)?;
        for pool in 0..count {
            let pool = u32::try_from(pool).map_err(|_| PegError::Storage(format!("pool id {pool} out of range")))?;
            let info = self.advanced_pool(txn, pool, now)?;
            txn.put_record(self.pool_key(pool), &info)?;
        }
        Ok(())
    }

    fn add_pool_in(
        &self,
        txn: &mut Txn<'_>,
        caller: &Address,
        stake_token: &str,
        alloc_weight: u64,
        lockup_secs: u64,
        now: Timestamp,
    ) -> Result<PoolId, PegError> {
        self.core.roles.ensure_role(Role::Admin, caller)?;
        if !self.stake_tokens.contains_key(stake_token) {
            return Err(PegError::invalid(format!("stake token {stake_token} is not registered")));
        }
        self.advance_all(txn, now)?;
        let count = txn.get_u64(&self.count_key)?;
        let pool = u32::try_from(count).map_err(|_| PegError::overflow("pool count"))?;
        let total_weight = txn
            .get_u64(&self.weight_key)?
            .checked_add(alloc_weight)
            .ok_or_else(|| PegError::overflow("total pool weight"))?;
        let info = PoolInfo {
            stake_token: stake_token.to_string(),
            alloc_weight,
            lockup_secs,
            last_reward_at: now.as_secs(),
            acc_reward_per_share: 0,
            total_staked: 0,
        };
        txn.put_record(self.pool_key(pool), &info)?;
        txn.put_u64(self.weight_key.clone(), total_weight);
        txn.put_u64(self.count_key.clone(), count + 1);
        txn.emit(PegEvent::PoolConfigured {
            scope: self.core.scope.clone(),
            pool,
            alloc_weight,
            lockup_secs,
        });
        Ok(pool)
    }

    fn set_pool_weight_in(
        &self,
        txn: &mut Txn<'_>,
        caller: &Address,
        pool: PoolId,
        alloc_weight: u64,
        now: Timestamp,
    ) -> Result<(), PegError> {
        self.core.roles.ensure_role(Role::Admin, caller)?;
        self.load_pool(&*txn, pool)?;
        self.advance_all(txn, now)?;
        let mut info = self.load_pool(&*txn, pool)?;
        let total_weight = txn
            .get_u64(&self.weight_key)?
            .checked_sub(info.alloc_weight)
            .and_then(|w| w.checked_add(alloc_weight))
            .ok_or_else(|| PegError::overflow("total pool weight"))?;
        info.alloc_weight = alloc_weight;
        txn.put_record(self.pool_key(pool), &info)?;
        txn.put_u64(self.weight_key.clone(), total_weight);
        txn.emit(PegEvent::PoolConfigured {
            scope: self.core.scope.clone(),
            pool,
            alloc_weight,
            lockup_secs: info.lockup_secs,
        });
        Ok(())
    }

    /// Mint `amount` of reward to `account` if non-zero.
    fn pay(&self, txn: &mut Txn<'_>, account: &Address, pool: PoolId, amount: Amount) -> Result<(), PegError> {
        if amount == 0 {
            return Ok(());
        }
        self.core.reward.mint_in(txn, &self.core.principal, account, amount)?;
        txn.emit(PegEvent::RewardPaid {
            scope: self.core.scope.clone(),
            pool,
            account: *account,
            amount,
        });
        Ok(())
    }

    fn deposit_in(
        &self,
        txn: &mut Txn<'_>,
        caller: &Address,
        pool: PoolId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<(), PegError> {
        self.core.pausable.ensure_not_paused(&*txn)?;
        if amount == 0 {
            return Err(PegError::invalid("deposit: amount must be larger than 0"));
        }
        let mut info = self.advanced_pool(txn, pool, now)?;
        let position_key = self.core.position_key(pool, caller);
        let mut position: PoolPosition = txn.get_record(&position_key)?.unwrap_or_default();

        let owed = info.owed(&position)?;
        position.unclaimed = position
            .unclaimed
            .checked_add(owed)
            .ok_or_else(|| PegError::overflow("unclaimed reward"))?;
        self.stake_token(&info)?
            .transfer_from_in(txn, &self.core.principal, caller, &self.core.principal, amount)?;
        position.amount = position
            .amount
            .checked_add(amount)
            .ok_or_else(|| PegError::overflow("staked amount"))?;
        position.deposit_at = now.as_secs();
        position.reward_debt = info.accumulated(position.amount)?;
        info.total_staked = info
            .total_staked
            .checked_add(amount)
            .ok_or_else(|| PegError::overflow("pool total staked"))?;

        txn.put_record(position_key, &position)?;
        txn.put_record(self.pool_key(pool), &info)?;
        txn.emit(PegEvent::Staked {
            scope: self.core.scope.clone(),
            pool,
            account: *caller,
            amount,
        });
        Ok(())
    }

    fn withdraw_in(
        &self,
        txn: &mut Txn<'_>,
        caller: &Address,
        pool: PoolId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Amount, PegError> {
        self.core.pausable.ensure_not_paused(&*txn)?;
        if amount == 0 {
            return Err(PegError::invalid("withdraw: cannot withdraw 0"));
        }
        let mut info = self.advanced_pool(txn, pool, now)?;
        let position_key = self.core.position_key(pool, caller);
        let mut position: PoolPosition = txn.get_record(&position_key)?.unwrap_or_default();
        if amount > position.amount {
            return Err(PegError::ExceedsBalance {
                context: "withdraw: amount exceeds balance".into(),
                requested: amount,
                staked: position.amount,
            });
        }

        let owed = info
            .owed(&position)?
            .checked_add(position.unclaimed)
            .ok_or_else(|| PegError::overflow("unclaimed reward"))?;
        let locked = now.as_secs() < info.unlocks_at(&position);
        let paid = if self.lock_withdraw_rewards && locked {
            position.unclaimed = owed;
            0
        } else {
            position.unclaimed = 0;
            owed
        };
        position.amount -= amount;
        position.reward_debt = info.accumulated(position.amount)?;
        info.total_staked = info.total_staked.saturating_sub(amount);

        self.stake_token(&info)?
            .transfer_in(txn, &self.core.principal, caller, amount)?;
        self.pay(txn, caller, pool, paid)?;
        txn.put_record(position_key, &position)?;
        txn.put_record(self.pool_key(pool), &info)?;
        txn.emit(PegEvent::Withdrawn {
            scope: self.core.scope.clone(),
            pool,
            account: *caller,
            amount,
        });
        Ok(paid)
    }

    fn get_reward_in(&self, txn: &mut Txn<'_>, caller: &Address, pool: PoolId, now: Timestamp) -> Result<Amount, PegError> {
        self.core.pausable.ensure_not_paused(&*txn)?;
        let info = self.advanced_pool(txn, pool, now)?;
        let position_key = self.core.position_key(pool, caller);
        let mut position: PoolPosition = txn.get_record(&position_key)?.unwrap_or_default();
        let unlock_at = info.unlocks_at(&position);
        if now.as_secs() < unlock_at {
            tracing::debug!(
                scope = %self.core.scope,
                pool,
                account = %caller,
                remaining = %format_duration(unlock_at - now.as_secs()),
                "reward claim while locked"
            );
            return Err(PegError::Locked { unlock_at });
        }
        let owed = info
            .owed(&position)?
            .checked_add(position.unclaimed)
            .ok_or_else(|| PegError::overflow("unclaimed reward"))?;
        position.unclaimed = 0;
        position.reward_debt = info.accumulated(position.amount)?;
        self.pay(txn, caller, pool, owed)?;
        txn.put_record(position_key, &position)?;
        txn.put_record(self.pool_key(pool), &info)?;
        Ok(owed)
    }

    /// Writers of every component a stake movement in `pool` touches. An
    /// unknown pool is reported later by the staged operation.
    fn locks_for(&self, pool: PoolId) -> Vec<&WriterLock> {
        let mut locks = vec![&self.core.writer, self.core.reward.writer()];
        if let Some(ledger) = self
            .pool(pool)
            .ok()
            .and_then(|info| self.stake_tokens.get(&info.stake_token))
        {
            locks.push(ledger.writer());
        }
        locks
    }
}

impl StakingEngine for PoolStaking {
    fn deposit(&self, caller: &Address, pool: PoolId, amount: Amount) -> Result<(), PegError> {
        let locks = self.locks_for(pool);
        let _guards = lock_all(&locks);
        let now = self.core.clock.now();
        let mut txn = Txn::new(self.core.store.as_ref());
        let staged = self.deposit_in(&mut txn, caller, pool, amount, now);
        self.core.finish("deposit", txn, staged)?;
        tracing::info!(scope = %self.core.scope, pool, account = %caller, amount, "staked");
        Ok(())
    }

    fn withdraw(&self, caller: &Address, pool: PoolId, amount: Amount) -> Result<(), PegError> {
        let locks = self.locks_for(pool);
        let _guards = lock_all(&locks);
        let now = self.core.clock.now();
        let mut txn = Txn::new(self.core.store.as_ref());
        let staged = self.withdraw_in(&mut txn, caller, pool, amount, now);
        let paid = self.core.finish("withdraw", txn, staged)?;
        tracing::info!(scope = %self.core.scope, pool, account = %caller, amount, reward = paid, "withdrawn");
        Ok(())
    }

    fn get_reward(&self, caller: &Address, pool: PoolId) -> Result<Amount, PegError> {
        let _guards = lock_all(&[&self.core.writer, self.core.reward.writer()]);
        let now = self.core.clock.now();
        let mut txn = Txn::new(self.core.store.as_ref());
        let staged = self.get_reward_in(&mut txn, caller, pool, now);
        let paid = self.core.finish("get_reward", txn, staged)?;
        if paid > 0 {
            tracing::info!(scope = %self.core.scope, pool, account = %caller, amount = paid, "reward paid");
        }
        Ok(paid)
    }

    fn pending_reward(&self, account: &Address, pool: PoolId) -> Result<Amount, PegError> {
        let store = self.core.store.as_ref();
        let mut info = self.load_pool(store, pool)?;
        info.advance(
            self.core.clock.now().as_secs(),
            store.get_u128(&self.rps_key)?,
            store.get_u64(&self.weight_key)?,
        )?;
        let position = self.position(account, pool)?;
        info.owed(&position)?
            .checked_add(position.unclaimed)
            .ok_or_else(|| PegError::overflow("unclaimed reward"))
    }

    fn staked(&self, account: &Address, pool: PoolId) -> Result<Amount, PegError> {
        self.pool(pool)?;
        Ok(self.position(account, pool)?.amount)
    }

    fn pause(&self, caller: &Address) -> Result<(), PegError> {
        self.core.pause(caller)
    }

    fn unpause(&self, caller: &Address) -> Result<(), PegError> {
        self.core.unpause(caller)
    }

    fn is_paused(&self) -> Result<bool, PegError> {
        self.core.is_paused()
    }
}
