use std::sync::Arc;

use peg_access::{lock_all, Pausable, RoleStore, WriterLock};
use peg_ledger::{Ledger, LedgerVariant};
use peg_store::{KvStore, Txn};
use peg_types::{Address, Amount, EventBus, PegError, PegEvent, RedemptionKind, Role};

const SCOPE: &str = "controller";

/// Redemption controller.
///
/// The controller acts as its own principal: it must hold `OPERATOR` on the
/// reserve ledger, `MINTER` on the pegged ledger, and users approve it as
/// spender of their pegged balance. All three components must share the
/// same store.
pub struct RedemptionController {
    principal: Address,
    reserve: Arc<Ledger>,
    pegged: Arc<Ledger>,
    roles: Arc<dyn RoleStore>,
    store: Arc<dyn KvStore>,
    events: Arc<EventBus>,
    pausable: Pausable,
    writer: WriterLock,
}

impl RedemptionController {
    pub fn new(
        principal: Address,
        reserve: Arc<Ledger>,
        pegged: Arc<Ledger>,
        roles: Arc<dyn RoleStore>,
        store: Arc<dyn KvStore>,
        events: Arc<EventBus>,
    ) -> Result<Self, PegError> {
        if principal.is_zero() {
            return Err(PegError::invalid("controller principal must not be the zero address"));
        }
        if reserve.variant() != LedgerVariant::Restricted {
            return Err(PegError::invalid("reserve ledger must be the restricted variant"));
        }
        if pegged.variant() != LedgerVariant::Open {
            return Err(PegError::invalid("pegged ledger must be the open variant"));
        }
        Ok(Self {
            principal,
            reserve,
            pegged,
            roles,
            store,
            events,
            pausable: Pausable::new(SCOPE),
            writer: WriterLock::new(SCOPE),
        })
    }

    /// Address the ledgers see as the caller of redemption legs.
    pub fn principal(&self) -> Address {
        self.principal
    }

    pub fn is_paused(&self) -> Result<bool, PegError> {
        self.pausable.is_paused(self.store.as_ref())
    }

    /// Burn `burn_amount` of the reserve asset from `account` and mint
    /// `mint_amount` of the pegged asset to it. Requires `REDEEMER`.
    pub fn redeem_agc(
        &self,
        caller: &Address,
        account: &Address,
        burn_amount: Amount,
        mint_amount: Amount,
    ) -> Result<(), PegError> {
        self.redeem(RedemptionKind::ReserveToPegged, caller, account, burn_amount, mint_amount)
    }

    /// Burn `burn_amount` of the pegged asset from `account` (through the
    /// controller's allowance) and mint `mint_amount` of the reserve asset.
    /// Requires `REDEEMER`.
    pub fn redeem_usc(
        &self,
        caller: &Address,
        account: &Address,
        burn_amount: Amount,
        mint_amount: Amount,
    ) -> Result<(), PegError> {
        self.redeem(RedemptionKind::PeggedToReserve, caller, account, burn_amount, mint_amount)
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

    fn redeem(
        &self,
        kind: RedemptionKind,
        caller: &Address,
        account: &Address,
        burn_amount: Amount,
        mint_amount: Amount,
    ) -> Result<(), PegError> {
        let (burn_ledger, mint_ledger) = self.legs(kind);

        let _guards = lock_all(&[&self.writer, self.reserve.writer(), self.pegged.writer()]);
        let mut txn = Txn::new(self.store.as_ref());
        if let Err(e) = self.stage_redemption(&mut txn, kind, caller, account, burn_amount, mint_amount) {
            tracing::debug!(?kind, %account, burn_amount, mint_amount, error = %e, "redemption rejected");
            return Err(e);
        }

        txn.emit(PegEvent::Redeemed {
            kind,
            account: *account,
            burned: burn_amount,
            minted: mint_amount,
        });
        txn.commit(&self.events)?;
        tracing::info!(
            ?kind,
            %account,
            burned = burn_amount,
            burn_ledger = burn_ledger.symbol(),
            minted = mint_amount,
            mint_ledger = mint_ledger.symbol(),
            "redeemed"
        );
        Ok(())
    }

    /// `(burn side, mint side)` of a redemption.
    fn legs(&self, kind: RedemptionKind) -> (&Ledger, &Ledger) {
        match kind {
            RedemptionKind::ReserveToPegged => (self.reserve.as_ref(), self.pegged.as_ref()),
            RedemptionKind::PeggedToReserve => (self.pegged.as_ref(), self.reserve.as_ref()),
        }
    }

    /// Validate everything that can be checked up front, then stage the
    /// burn leg and the mint leg.
    fn stage_redemption(
        &self,
        txn: &mut Txn<'_>,
        kind: RedemptionKind,
        caller: &Address,
        account: &Address,
        burn_amount: Amount,
        mint_amount: Amount,
    ) -> Result<(), PegError> {
        let (burn_ledger, mint_ledger) = self.legs(kind);

        self.pausable.ensure_not_paused(&*txn)?;
        self.roles.ensure_role(Role::Redeemer, caller)?;
        if account.is_zero() {
            return Err(PegError::invalid("TokenController: cannot redeem for zero address"));
        }
        if burn_amount == 0 {
            return Err(PegError::invalid(format!("{} amount must be larger than 0", burn_ledger.symbol())));
        }
        if mint_amount == 0 {
            return Err(PegError::invalid(format!("{} amount must be larger than 0", mint_ledger.symbol())));
        }
        if burn_ledger.variant() == LedgerVariant::Open {
            let allowance = burn_ledger.allowance_in(&*txn, account, &self.principal)?;
            if allowance != Amount::MAX && allowance < burn_amount {
                return Err(PegError::InsufficientAllowance {
                    context: format!("insufficient {} allowance for burning", burn_ledger.symbol()),
                    needed: burn_amount,
                    available: allowance,
                });
            }
        }
        let balance = burn_ledger.balance_in(&*txn, account)?;
        if balance < burn_amount {
            return Err(PegError::InsufficientBalance {
                context: format!("insufficient {} balance", burn_ledger.symbol()),
                needed: burn_amount,
                available: balance,
            });
        }

        burn_ledger.burn_from_in(txn, &self.principal, account, burn_amount)?;
        mint_ledger.mint_in(txn, &self.principal, account, mint_amount)
    }
}
