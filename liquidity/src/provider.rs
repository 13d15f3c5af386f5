use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use peg_access::{lock_all, Pausable, RoleStore, WriterLock};
use peg_ledger::Ledger;
use peg_store::{Key, KvRead, KvStore, Txn};
use peg_types::amount::apply_bps_haircut;
use peg_types::{Address, Amount, DexRouter, EventBus, PegError, PegEvent, Role};

pub const DEFAULT_SLIPPAGE_BPS: u32 = 50;
/// 5%.
pub const MAX_SLIPPAGE_BPS: u32 = 500;

#[derive(Clone, Debug)]
pub struct LiquidityConfig {
    pub scope: String,
    /// Account the ledgers and the DEX see as the provider.
    pub principal: Address,
    /// Receives withdrawn LP tokens and collected fees.
    pub owner: Address,
    /// Only written the first time the scope is opened.
    pub slippage_bps: u32,
}

impl LiquidityConfig {
    pub fn new(scope: impl Into<String>, principal: Address, owner: Address) -> Self {
        Self {
            scope: scope.into(),
            principal,
            owner,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
        }
    }
}

/// DEX position whose fees `collect_fee` harvests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyPosition {
    pub position_id: u64,
    pub fee_tier: u32,
}

pub struct LiquidityAutoProvider {
    config: LiquidityConfig,
    tokens: HashMap<Address, Arc<Ledger>>,
    dex: Arc<dyn DexRouter>,
    roles: Arc<dyn RoleStore>,
    store: Arc<dyn KvStore>,
    events: Arc<EventBus>,
    pausable: Pausable,
    writer: WriterLock,
    slippage_key: Vec<u8>,
    position_key: Vec<u8>,
}

impl LiquidityAutoProvider {
    /// `tokens` binds DEX token addresses to the ledgers that hold them.
    /// Users approve the principal as spender on those ledgers.
    pub fn new(
        config: LiquidityConfig,
        tokens: Vec<(Address, Arc<Ledger>)>,
        dex: Arc<dyn DexRouter>,
        roles: Arc<dyn RoleStore>,
        store: Arc<dyn KvStore>,
        events: Arc<EventBus>,
    ) -> Result<Self, PegError> {
        if config.principal.is_zero() || config.owner.is_zero() {
            return Err(PegError::invalid("liquidity provider accounts must not be the zero address"));
        }
        validate_slippage(config.slippage_bps)?;
        let slippage_key = Key::new(&config.scope).seg("slippage").into_vec();
        let position_key = Key::new(&config.scope).seg("position").into_vec();
        let provider = Self {
            tokens: tokens.into_iter().collect(),
            dex,
            roles,
            store,
            events,
            pausable: Pausable::new(config.scope.clone()),
            writer: WriterLock::new(config.scope.clone()),
            slippage_key,
            position_key,
            config,
        };
        if provider.store.get_raw(&provider.slippage_key)?.is_none() {
            let mut txn = Txn::new(provider.store.as_ref());
            txn.put_u64(provider.slippage_key.clone(), u64::from(provider.config.slippage_bps));
            txn.commit(&provider.events)?;
        }
        Ok(provider)
    }

    pub fn principal(&self) -> Address {
        self.config.principal
    }

    pub fn owner(&self) -> Address {
        self.config.owner
    }

    pub fn is_paused(&self) -> Result<bool, PegError> {
        self.pausable.is_paused(self.store.as_ref())
    }

    pub fn slippage_tolerance(&self) -> Result<u32, PegError> {
        let bps = self.store.get_u64(&self.slippage_key)?;
        u32::try_from(bps).map_err(|_| PegError::Storage(format!("slippage {bps} out of range")))
    }

    pub fn company_position(&self) -> Result<CompanyPosition, PegError> {
        Ok(self.store.get_record(&self.position_key)?.unwrap_or_default())
    }

    pub fn lp_balance(&self) -> Result<Amount, PegError> {
        self.dex.lp_balance_of(&self.config.principal)
    }

    /// Pull `amount` of `token` from `caller`, swap half for the other side
    /// of the pair and add both as liquidity. Returns the LP amount minted
    /// to the principal.
    ///
    /// The pull is staged and validated first. Both DEX legs then run as one
    /// router call, and the ledger commits only after it succeeds.
    pub fn provide_liquidity(&self, caller: &Address, token: &Address, amount: Amount) -> Result<Amount, PegError> {
        let ledger = self.tokens.get(token);
        let mut locks = vec![&self.writer];
        if let Some(ledger) = ledger {
            locks.push(ledger.writer());
        }
        let _guards = lock_all(&locks);
        let mut txn = Txn::new(self.store.as_ref());
        let liquidity = match self.provide_in(&mut txn, ledger, caller, token, amount) {
            Ok(liquidity) => liquidity,
            Err(e) => {
                tracing::debug!(scope = %self.config.scope, token = %token, amount, error = %e, "provide liquidity rejected");
                return Err(e);
            }
        };
        if let Err(e) = txn.commit(&self.events) {
            tracing::error!(scope = %self.config.scope, provider = %caller, token = %token, amount, liquidity, error = %e, "pair updated but ledger pull not committed");
            return Err(e.into());
        }
        tracing::info!(scope = %self.config.scope, provider = %caller, token = %token, amount, liquidity, "liquidity provided");
        Ok(liquidity)
    }

    fn provide_in(
        &self,
        txn: &mut Txn<'_>,
        ledger: Option<&Arc<Ledger>>,
        caller: &Address,
        token: &Address,
        amount: Amount,
    ) -> Result<Amount, PegError> {
        self.pausable.ensure_not_paused(&*txn)?;
        if token.is_zero() {
            return Err(PegError::invalid("provideLiquidity: zero token address"));
        }
        let reserves = self.dex.get_reserves()?;
        let (Some(ledger), Some((reserve_in, reserve_out, other))) = (ledger, reserves.oriented(token)) else {
            return Err(PegError::invalid("provideLiquidity: invalid token address"));
        };
        if amount == 0 {
            return Err(PegError::invalid("provideLiquidity: bad amount"));
        }

        let principal = self.config.principal;
        ledger.transfer_from_in(txn, &principal, caller, &self.dex.pair_address(), amount)?;

        let swap_in = amount / 2;
        let keep = amount - swap_in;
        let quoted = self.dex.get_amount_out(swap_in, reserve_in, reserve_out)?;
        let min_out = apply_bps_haircut(quoted, self.slippage_tolerance()?)
            .ok_or_else(|| PegError::overflow("slippage bound"))?;
        // Last fallible step before commit: the pair cannot be rolled back.
        let receipt = self
            .dex
            .swap_and_add_liquidity(swap_in, keep, min_out, &[*token, other], &principal)?;
        let liquidity = receipt.liquidity;
        txn.emit(PegEvent::LiquidityProvided {
            provider: *caller,
            token: *token,
            amount_in: amount,
            liquidity,
        });
        Ok(liquidity)
    }

    /// Move the principal's whole LP balance to the owner. Requires
    /// `WITHDRAWER`.
    pub fn withdraw_lp_tokens(&self, caller: &Address) -> Result<Amount, PegError> {
        let _guard = self.writer.lock();
        self.roles.ensure_role(Role::Withdrawer, caller)?;
        let amount = self.dex.lp_balance_of(&self.config.principal)?;
        if amount == 0 {
            return Err(PegError::invalid("withdrawLpTokens: withdraw zero amount"));
        }
        self.dex.transfer_lp(&self.config.principal, &self.config.owner, amount)?;
        self.events.emit(&PegEvent::LpTokensWithdrawn {
            to: self.config.owner,
            amount,
        });
        tracing::info!(scope = %self.config.scope, to = %self.config.owner, amount, "lp tokens withdrawn");
        Ok(amount)
    }

    /// Requires `ADMIN`. Accepts `0..=MAX_SLIPPAGE_BPS`.
    pub fn set_slippage_tolerance(&self, caller: &Address, bps: u32) -> Result<(), PegError> {
        let _guard = self.writer.lock();
        let mut txn = Txn::new(self.store.as_ref());
        self.pausable.ensure_not_paused(&txn)?;
        self.roles.ensure_role(Role::Admin, caller)?;
        validate_slippage(bps)?;
        txn.put_u64(self.slippage_key.clone(), u64::from(bps));
        txn.commit(&self.events)?;
        tracing::info!(scope = %self.config.scope, bps, "slippage tolerance updated");
        Ok(())
    }

    /// Point fee collection at another DEX position. Requires `ADMIN`.
    pub fn set_company_token(&self, caller: &Address, position_id: u64, fee_tier: u32) -> Result<(), PegError> {
        let _guard = self.writer.lock();
        let mut txn = Txn::new(self.store.as_ref());
        self.pausable.ensure_not_paused(&txn)?;
        self.roles.ensure_role(Role::Admin, caller)?;
        txn.put_record(self.position_key.clone(), &CompanyPosition { position_id, fee_tier })?;
        txn.commit(&self.events)?;
        tracing::info!(scope = %self.config.scope, position_id, fee_tier, "company position updated");
        Ok(())
    }

    /// Collect accrued fees of the company position to the owner. Requires
    /// `OPERATOR`.
    pub fn collect_fee(&self, caller: &Address) -> Result<(Amount, Amount), PegError> {
        let _guard = self.writer.lock();
        self.roles.ensure_role(Role::Operator, caller)?;
        let position = self.company_position()?;
        let (amount0, amount1) = self.dex.collect(position.position_id, &self.config.owner)?;
        self.events.emit(&PegEvent::FeeCollected {
            position_id: position.position_id,
            amount0,
            amount1,
        });
        tracing::info!(scope = %self.config.scope, position_id = position.position_id, amount0, amount1, "fees collected");
        Ok((amount0, amount1))
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
}

fn validate_slippage(bps: u32) -> Result<(), PegError> {
    if bps > MAX_SLIPPAGE_BPS {
        return Err(PegError::invalid("slippageTolerance: must be between 0% and 5%"));
    }
    Ok(())
}
