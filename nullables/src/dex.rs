//! Nullable DEX: a scripted constant-product pair for testing.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use peg_types::{Address, Amount, DexRouter, PairReserves, PegError, ZapReceipt};

struct DexState {
    reserves: PairReserves,
    fee_bps: u32,
    quote_override: Option<Amount>,
    realized_override: Option<Amount>,
    fail_add_liquidity: bool,
    pending_fees: (Amount, Amount),
    lp_balances: HashMap<Address, Amount>,
    swaps: usize,
    liquidity_adds: usize,
}

/// A deterministic [`DexRouter`].
///
/// Quotes follow the constant-product formula with a configurable fee
/// unless a fixed quote is scripted. The realized swap output can be
/// scripted separately to exercise slippage protection.
pub struct NullDex {
    pair: Address,
    state: Mutex<DexState>,
}

impl NullDex {
    pub fn new(pair: Address, reserves: PairReserves) -> Self {
        Self {
            pair,
            state: Mutex::new(DexState {
                reserves,
                fee_bps: 25,
                quote_override: None,
                realized_override: None,
                fail_add_liquidity: false,
                pending_fees: (0, 0),
                lp_balances: HashMap::new(),
                swaps: 0,
                liquidity_adds: 0,
            }),
        }
    }

    pub fn set_fee_bps(&self, fee_bps: u32) {
        self.state().fee_bps = fee_bps;
    }

    /// Return `quote` from `get_amount_out` regardless of reserves.
    pub fn script_quote(&self, quote: Amount) {
        self.state().quote_override = Some(quote);
    }

    /// Make the next swaps deliver exactly `output`.
    pub fn script_realized_output(&self, output: Amount) {
        self.state().realized_override = Some(output);
    }

    pub fn fail_add_liquidity(&self, fail: bool) {
        self.state().fail_add_liquidity = fail;
    }

    /// Fees returned by the next `collect`.
    pub fn accrue_fees(&self, amount0: Amount, amount1: Amount) {
        let mut state = self.state();
        state.pending_fees.0 += amount0;
        state.pending_fees.1 += amount1;
    }

    pub fn swap_count(&self) -> usize {
        self.state().swaps
    }

    pub fn liquidity_add_count(&self) -> usize {
        self.state().liquidity_adds
    }

    fn state(&self) -> MutexGuard<'_, DexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DexState {
    /// Input token and output of a swap, without touching the pair.
    fn quote_swap(&self, amount_in: Amount, amount_out_min: Amount, path: &[Address]) -> Result<(Address, Amount), PegError> {
        let token_in = *path.first().ok_or_else(|| PegError::invalid("dex: empty path"))?;
        let (reserve_in, reserve_out, _) = self
            .reserves
            .oriented(&token_in)
            .ok_or_else(|| PegError::invalid("dex: token not in pair"))?;
        let out = match self.realized_override {
            Some(out) => out,
            None => constant_product_out(amount_in, reserve_in, reserve_out, self.fee_bps)
                .ok_or_else(|| PegError::invalid("dex: insufficient liquidity"))?,
        };
        if out < amount_out_min {
            return Err(PegError::SlippageExceeded {
                received: out,
                minimum: amount_out_min,
            });
        }
        Ok((token_in, out))
    }

    fn check_add(&self) -> Result<(), PegError> {
        if self.fail_add_liquidity {
            return Err(PegError::invalid("dex: add liquidity rejected"));
        }
        Ok(())
    }

    fn apply_swap(&mut self, token_in: &Address, amount_in: Amount, out: Amount) {
        if *token_in == self.reserves.token0 {
            self.reserves.reserve0 += amount_in;
            self.reserves.reserve1 = self.reserves.reserve1.saturating_sub(out);
        } else {
            self.reserves.reserve1 += amount_in;
            self.reserves.reserve0 = self.reserves.reserve0.saturating_sub(out);
        }
        self.swaps += 1;
    }

    fn apply_add(&mut self, token_a: &Address, amount_a: Amount, amount_b: Amount, to: &Address) -> Amount {
        if *token_a == self.reserves.token0 {
            self.reserves.reserve0 += amount_a;
            self.reserves.reserve1 += amount_b;
        } else {
            self.reserves.reserve1 += amount_a;
            self.reserves.reserve0 += amount_b;
        }
        let liquidity = amount_a.min(amount_b);
        *self.lp_balances.entry(*to).or_insert(0) += liquidity;
        self.liquidity_adds += 1;
        liquidity
    }
}

fn constant_product_out(amount_in: Amount, reserve_in: Amount, reserve_out: Amount, fee_bps: u32) -> Option<Amount> {
    let in_with_fee = amount_in.checked_mul(u128::from(10_000 - fee_bps.min(10_000)))?;
    let numerator = in_with_fee.checked_mul(reserve_out)?;
    let denominator = reserve_in.checked_mul(10_000)?.checked_add(in_with_fee)?;
    if denominator == 0 {
        return None;
    }
    Some(numerator / denominator)
}

impl DexRouter for NullDex {
    fn pair_address(&self) -> Address {
        self.pair
    }

    fn get_reserves(&self) -> Result<PairReserves, PegError> {
        Ok(self.state().reserves)
    }

    fn get_amount_out(&self, amount_in: Amount, reserve_in: Amount, reserve_out: Amount) -> Result<Amount, PegError> {
        let state = self.state();
        if let Some(quote) = state.quote_override {
            return Ok(quote);
        }
        constant_product_out(amount_in, reserve_in, reserve_out, state.fee_bps)
            .ok_or_else(|| PegError::invalid("dex: insufficient liquidity"))
    }

    fn swap_exact_tokens_for_tokens(
        &self,
        amount_in: Amount,
        amount_out_min: Amount,
        path: &[Address],
        _to: &Address,
    ) -> Result<Vec<Amount>, PegError> {
        let mut state = self.state();
        let (token_in, out) = state.quote_swap(amount_in, amount_out_min, path)?;
        state.apply_swap(&token_in, amount_in, out);
        Ok(vec![amount_in, out])
    }

    fn add_liquidity(
        &self,
        token_a: &Address,
        _token_b: &Address,
        amount_a: Amount,
        amount_b: Amount,
        to: &Address,
    ) -> Result<(Amount, Amount, Amount), PegError> {
        let mut state = self.state();
        state.check_add()?;
        let liquidity = state.apply_add(token_a, amount_a, amount_b, to);
        Ok((amount_a, amount_b, liquidity))
    }

    fn swap_and_add_liquidity(
        &self,
        swap_in: Amount,
        keep: Amount,
        amount_out_min: Amount,
        path: &[Address],
        to: &Address,
    ) -> Result<ZapReceipt, PegError> {
        let mut state = self.state();
        let (token_in, out) = state.quote_swap(swap_in, amount_out_min, path)?;
        state.check_add()?;
        state.apply_swap(&token_in, swap_in, out);
        let liquidity = state.apply_add(&token_in, keep, out, to);
        Ok(ZapReceipt {
            swapped_out: out,
            amount_a: keep,
            amount_b: out,
            liquidity,
        })
    }

    fn collect(&self, _position_id: u64, _recipient: &Address) -> Result<(Amount, Amount), PegError> {
        let mut state = self.state();
        Ok(std::mem::take(&mut state.pending_fees))
    }

    fn lp_balance_of(&self, holder: &Address) -> Result<Amount, PegError> {
        Ok(self.state().lp_balances.get(holder).copied().unwrap_or(0))
    }

    fn transfer_lp(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), PegError> {
        let mut state = self.state();
        let available = state.lp_balances.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(PegError::InsufficientBalance {
                context: "lp transfer".into(),
                needed: amount,
                available,
            });
        }
        state.lp_balances.insert(*from, available - amount);
        *state.lp_balances.entry(*to).or_insert(0) += amount;
        Ok(())
    }
}
