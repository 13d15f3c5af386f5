//! The interface shared by both reward models.

use peg_types::{Address, Amount, PegError};

pub type PoolId = u32;

pub trait StakingEngine: Send + Sync {
    /// Pull `amount` of the pool's stake token from `caller`.
    fn deposit(&self, caller: &Address, pool: PoolId, amount: Amount) -> Result<(), PegError>;

    /// Return `amount` of staked tokens to `caller`.
    fn withdraw(&self, caller: &Address, pool: PoolId, amount: Amount) -> Result<(), PegError>;

    /// Mint the caller's accrued reward. Returns the amount paid.
    fn get_reward(&self, caller: &Address, pool: PoolId) -> Result<Amount, PegError>;

    /// Reward `account` could claim right now.
    fn pending_reward(&self, account: &Address, pool: PoolId) -> Result<Amount, PegError>;

    fn staked(&self, account: &Address, pool: PoolId) -> Result<Amount, PegError>;

    fn pause(&self, caller: &Address) -> Result<(), PegError>;

    fn unpause(&self, caller: &Address) -> Result<(), PegError>;

    fn is_paused(&self) -> Result<bool, PegError>;
}
