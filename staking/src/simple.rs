//! Single-pool staking with a fixed yearly ROI.
//!
//! Each account accrues `amount * elapsed * roi / 10000 / SECONDS_PER_YEAR`
//! on top of the reward snapshotted at its last deposit, withdrawal or claim.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use peg_access::{lock_all, RoleStore};
use peg_ledger::Ledger;
use peg_store::{KvRead, KvStore, Txn};
use peg_types::{
    Address, Amount, Clock, EventBus, PegError, PegEvent, Role, Timestamp, BPS_DENOMINATOR, SECONDS_PER_YEAR,
};

use crate::core::EngineCore;
use crate::{PoolId, StakingEngine};

/// The only pool a [`SimpleStaking`] engine serves.
const POOL: PoolId = 0;

#[derive(Clone, Debug)]
pub struct SimpleStakingConfig {
    pub scope: String,
    pub principal: Address,
    /// Yearly return in basis points (`2000` = 20%).
    pub roi_per_year: u64,
}

/// Per-account stake record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleStake {
    pub amount: Amount,
    /// Reward accrued up to `last_update`.
    pub previous: Amount,
    pub last_update: u64,
}

/// Reward owed for `stake` at `now`. Truncates after each division, in the
/// order `* elapsed * roi / 10000 / SECONDS_PER_YEAR`.
pub fn accrued_reward(stake: &SimpleStake, roi_per_year: u64, now: Timestamp) -> Result<Amount, PegError> {
    let elapsed = Timestamp::new(stake.last_update).elapsed_since(now);
    let fresh = stake
        .amount
        .checked_mul(u128::from(elapsed))
        .and_then(|v| v.checked_mul(u128::from(roi_per_year)))
        .ok_or_else(|| PegError::overflow("staking reward accrual"))?
        / BPS_DENOMINATOR
        / u128::from(SECONDS_PER_YEAR);
    stake
        .previous
        .checked_add(fresh)
        .ok_or_else(|| PegError::overflow("staking reward accrual"))
}

pub struct SimpleStaking {
    core: EngineCore,
    stake: Arc<Ledger>,
    roi_key: Vec<u8>,
    total_key: Vec<u8>,
}

impl SimpleStaking {
    /// The engine's principal needs `MINTER` on `reward` and users approve
    /// it as spender on `stake`. The configured ROI is only written the
    /// first time the scope is opened.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SimpleStakingConfig,
        stake: Arc<Ledger>,
        reward: Arc<Ledger>,
        store: Arc<dyn KvStore>,
        roles: Arc<dyn RoleStore>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PegError> {
        let core = EngineCore::new(&config.scope, config.principal, reward, store, roles, events, clock)?;
        let roi_key = core.key().seg("roi").into_vec();
        let total_key = core.key().seg("total").into_vec();
        let engine = Self {
            core,
            stake,
            roi_key,
            total_key,
        };
        if engine.core.store.get_raw(&engine.roi_key)?.is_none() {
            let mut txn = Txn::new(engine.core.store.as_ref());
            txn.put_u64(engine.roi_key.clone(), config.roi_per_year);
            txn.commit(&engine.core.events)?;
        }
        Ok(engine)
    }

    pub fn principal(&self) -> Address {
        self.core.principal
    }

    pub fn roi_per_year(&self) -> Result<u64, PegError> {
        Ok(self.core.store.get_u64(&self.roi_key)?)
    }

    /// Change the yearly ROI. Requires `ADMIN`. Accrual since each
    /// account's last snapshot is computed at the new rate.
    pub fn set_roi_per_year(&self, caller: &Address, roi_per_year: u64) -> Result<(), PegError> {
        let _guard = self.core.writer.lock();
        self.core.roles.ensure_role(Role::Admin, caller)?;
        let mut txn = Txn::new(self.core.store.as_ref());
        txn.put_u64(self.roi_key.clone(), roi_per_year);
        txn.commit(&self.core.events)?;
        tracing::info!(scope = %self.core.scope, roi_per_year, "staking roi updated");
        Ok(())
    }

    pub fn total_staked(&self) -> Result<Amount, PegError> {
        Ok(self.core.store.get_u128(&self.total_key)?)
    }

    pub fn stake_of(&self, account: &Address) -> Result<SimpleStake, PegError> {
        Ok(self
            .core
            .store
            .get_record(&self.core.position_key(POOL, account))?
            .unwrap_or_default())
    }

    fn check_pool(pool: PoolId) -> Result<(), PegError> {
        if pool != POOL {
            return Err(PegError::invalid(format!("unknown pool {pool}")));
        }
        Ok(())
    }

    /// Load `account`'s record with its pending reward folded into
    /// `previous` and the clock restarted at `now`.
    fn snapshot(&self, txn: &Txn<'_>, account: &Address, now: Timestamp) -> Result<SimpleStake, PegError> {
        let mut stake: SimpleStake = txn.get_record(&self.core.position_key(POOL, account))?.unwrap_or_default();
        stake.previous = accrued_reward(&stake, txn.get_u64(&self.roi_key)?, now)?;
        stake.last_update = now.as_secs();
        Ok(stake)
    }

    fn save(&self, txn: &mut Txn<'_>, account: &Address, stake: &SimpleStake) -> Result<(), PegError> {
        txn.put_record(self.core.position_key(POOL, account), stake)?;
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
        Self::check_pool(pool)?;
        if amount == 0 {
            return Err(PegError::invalid("deposit: amount must be larger than 0"));
        }
        let mut stake = self.snapshot(txn, caller, now)?;
        self.stake
            .transfer_from_in(txn, &self.core.principal, caller, &self.core.principal, amount)?;
        stake.amount = stake
            .amount
            .checked_add(amount)
            .ok_or_else(|| PegError::overflow("staked amount"))?;
        self.save(txn, caller, &stake)?;
        let total = txn
            .get_u128(&self.total_key)?
            .checked_add(amount)
            .ok_or_else(|| PegError::overflow("total staked"))?;
        txn.put_u128(self.total_key.clone(), total);
        txn.emit(PegEvent::Staked {
            scope: self.core.scope.clone(),
            pool: POOL,
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
    ) -> Result<(), PegError> {
        self.core.pausable.ensure_not_paused(&*txn)?;
        Self::check_pool(pool)?;
        if amount == 0 {
            return Err(PegError::invalid("withdraw: cannot withdraw 0"));
        }
        let mut stake = self.snapshot(txn, caller, now)?;
        if amount > stake.amount {
            return Err(PegError::ExceedsBalance {
                context: "withdraw: amount exceeds balance".into(),
                requested: amount,
                staked: stake.amount,
            });
        }
        stake.amount -= amount;
        self.save(txn, caller, &stake)?;
        let total = txn.get_u128(&self.total_key)?.saturating_sub(amount);
        txn.put_u128(self.total_key.clone(), total);
        self.stake.transfer_in(txn, &self.core.principal, caller, amount)?;
        txn.emit(PegEvent::Withdrawn {
            scope: self.core.scope.clone(),
            pool: POOL,
            account: *caller,
            amount,
        });
        Ok(())
    }

    fn get_reward_in(&self, txn: &mut Txn<'_>, caller: &Address, pool: PoolId, now: Timestamp) -> Result<Amount, PegError> {
        self.core.pausable.ensure_not_paused(&*txn)?;
        Self::check_pool(pool)?;
        let mut stake = self.snapshot(txn, caller, now)?;
        let reward = stake.previous;
        if reward == 0 {
            return Ok(0);
        }
        self.core.reward.mint_in(txn, &self.core.principal, caller, reward)?;
        stake.previous = 0;
        self.save(txn, caller, &stake)?;
        txn.emit(PegEvent::RewardPaid {
            scope: self.core.scope.clone(),
            pool: POOL,
            account: *caller,
            amount: reward,
        });
        Ok(reward)
    }
}

impl StakingEngine for SimpleStaking {
    fn deposit(&self, caller: &Address, pool: PoolId, amount: Amount) -> Result<(), PegError> {
        let _guards = lock_all(&[&self.core.writer, self.stake.writer()]);
        let now = self.core.clock.now();
        let mut txn = Txn::new(self.core.store.as_ref());
        let staged = self.deposit_in(&mut txn, caller, pool, amount, now);
        self.core.finish("deposit", txn, staged)?;
        tracing::info!(scope = %self.core.scope, account = %caller, amount, "staked");
        Ok(())
    }

    fn withdraw(&self, caller: &Address, pool: PoolId, amount: Amount) -> Result<(), PegError> {
        let _guards = lock_all(&[&self.core.writer, self.stake.writer()]);
        let now = self.core.clock.now();
        let mut txn = Txn::new(self.core.store.as_ref());
        let staged = self.withdraw_in(&mut txn, caller, pool, amount, now);
        self.core.finish("withdraw", txn, staged)?;
        tracing::info!(scope = %self.core.scope, account = %caller, amount, "withdrawn");
        Ok(())
    }

    fn get_reward(&self, caller: &Address, pool: PoolId) -> Result<Amount, PegError> {
        let _guards = lock_all(&[&self.core.writer, self.core.reward.writer()]);
        let now = self.core.clock.now();
        let mut txn = Txn::new(self.core.store.as_ref());
        let staged = self.get_reward_in(&mut txn, caller, pool, now);
        let paid = self.core.finish("get_reward", txn, staged)?;
        if paid > 0 {
            tracing::info!(scope = %self.core.scope, account = %caller, amount = paid, "reward paid");
        }
        Ok(paid)
    }

    fn pending_reward(&self, account: &Address, pool: PoolId) -> Result<Amount, PegError> {
        Self::check_pool(pool)?;
        accrued_reward(&self.stake_of(account)?, self.roi_per_year()?, self.core.clock.now())
    }

    fn staked(&self, account: &Address, pool: PoolId) -> Result<Amount, PegError> {
        Self::check_pool(pool)?;
        Ok(self.stake_of(account)?.amount)
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
