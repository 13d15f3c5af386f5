//! Boundary trait for the external swap protocol used by the liquidity
//! provider. Nothing in this workspace implements a real DEX; production
//! wiring supplies an adapter, tests use `peg_nullables::NullDex`.

use crate::{Address, Amount, PegError};

/// Reserves of a two-sided pool, in the pair's own token order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PairReserves {
    pub token0: Address,
    pub token1: Address,
    pub reserve0: Amount,
    pub reserve1: Amount,
}

impl PairReserves {
    /// Reserves ordered as `(reserve_in, reserve_out)` for a swap from
    /// `token_in`, or `None` if the token is not part of the pair.
    pub fn oriented(&self, token_in: &Address) -> Option<(Amount, Amount, Address)> {
        if *token_in == self.token0 {
            Some((self.reserve0, self.reserve1, self.token1))
        } else if *token_in == self.token1 {
            Some((self.reserve1, self.reserve0, self.token0))
        } else {
            None
        }
    }
}

/// Outcome of [`DexRouter::swap_and_add_liquidity`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZapReceipt {
    /// Output of the swap leg.
    pub swapped_out: Amount,
    pub amount_a: Amount,
    pub amount_b: Amount,
    pub liquidity: Amount,
}

/// Router and position-manager surface consumed by the liquidity provider.
///
/// Every mutating call applies fully or not at all. `amount_out_min` is
/// enforced by the router: a swap that would yield less fails with
/// `SlippageExceeded` and leaves the pair untouched.
pub trait DexRouter: Send + Sync {
    /// Ledger account that receives tokens committed to the pair.
    fn pair_address(&self) -> Address;

    fn get_reserves(&self) -> Result<PairReserves, PegError>;

    /// Quoted output for an exact input, including the pool fee.
    fn get_amount_out(
        &self,
        amount_in: Amount,
        reserve_in: Amount,
        reserve_out: Amount,
    ) -> Result<Amount, PegError>;

    /// Returns the amounts along the path; the last entry is the output.
    fn swap_exact_tokens_for_tokens(
        &self,
        amount_in: Amount,
        amount_out_min: Amount,
        path: &[Address],
        to: &Address,
    ) -> Result<Vec<Amount>, PegError>;

    /// Returns `(amount_a, amount_b, liquidity)`.
    fn add_liquidity(
        &self,
        token_a: &Address,
        token_b: &Address,
        amount_a: Amount,
        amount_b: Amount,
        to: &Address,
    ) -> Result<(Amount, Amount, Amount), PegError>;

    /// Swap `swap_in` of `path[0]` for `path[1]`, then add `keep` of
    /// `path[0]` and the swap output as liquidity for `to`. Both legs apply
    /// or neither does.
    fn swap_and_add_liquidity(
        &self,
        swap_in: Amount,
        keep: Amount,
        amount_out_min: Amount,
        path: &[Address],
        to: &Address,
    ) -> Result<ZapReceipt, PegError>;

    /// Collect accrued fees of a liquidity position. Returns `(amount0, amount1)`.
    fn collect(&self, position_id: u64, recipient: &Address) -> Result<(Amount, Amount), PegError>;

    fn lp_balance_of(&self, holder: &Address) -> Result<Amount, PegError>;

    fn transfer_lp(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), PegError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oriented_follows_input_token() {
        let a = Address::from_low_u8(1);
        let b = Address::from_low_u8(2);
        let reserves = PairReserves {
            token0: a,
            token1: b,
            reserve0: 10,
            reserve1: 20,
        };
        assert_eq!(reserves.oriented(&a), Some((10, 20, b)));
        assert_eq!(reserves.oriented(&b), Some((20, 10, a)));
        assert_eq!(reserves.oriented(&Address::from_low_u8(3)), None);
    }
}
