//! Staking engines.
//!
//! Two reward models share the [`StakingEngine`] interface:
//!
//! - [`SimpleStaking`]: one pool, a fixed yearly ROI in basis points,
//!   accrued linearly per account.
//! - [`PoolStaking`]: several weighted pools sharing a global reward rate,
//!   with an accumulated-reward-per-share index and optional lockups.
//!
//! Deposits are pulled from the stake ledger with `transfer_from` (the
//! engine's principal is the spender), withdrawals are paid back from the
//! engine's own balance, and rewards are minted on the reward ledger, where
//! the engine must hold `MINTER`.

pub mod core;
pub mod engine;
pub mod pool;
pub mod simple;

pub use engine::{PoolId, StakingEngine};
pub use pool::{PoolInfo, PoolPosition, PoolStaking, PoolStakingConfig, PRECISION};
pub use simple::{accrued_reward, SimpleStake, SimpleStaking, SimpleStakingConfig};
