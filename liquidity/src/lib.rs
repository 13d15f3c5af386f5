//! Liquidity auto-provider.
//!
//! Pulls a single-sided deposit from a user, swaps half of it for the other
//! side of a two-token DEX pair, and adds both halves as liquidity. The LP
//! position belongs to the provider's principal until a withdrawer moves it
//! to the configured owner.

pub mod provider;

pub use provider::{CompanyPosition, LiquidityAutoProvider, LiquidityConfig, DEFAULT_SLIPPAGE_BPS, MAX_SLIPPAGE_BPS};
