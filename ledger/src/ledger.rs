use std::sync::Arc;

use peg_access::{Pausable, RoleStore, WriterLock};
use peg_store::{KvRead, KvStore, Txn};
use peg_types::{Address, Amount, EventBus, PegError, PegEvent, Role};

use crate::keys::LedgerKeys;
use crate::{users, LedgerConfig, LedgerVariant};

/// A role-gated token ledger.
///
/// Checks run in a fixed order on every mutation: pause state, then the
/// caller's role, then arguments, then balances and allowances.
pub struct Ledger {
    pub(crate) config: LedgerConfig,
    pub(crate) store: Arc<dyn KvStore>,
    pub(crate) roles: Arc<dyn RoleStore>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) pausable: Pausable,
    pub(crate) writer: WriterLock,
    pub(crate) keys: LedgerKeys,
}

impl Ledger {
    /// Open a ledger, minting the genesis supply to the treasury the first
    /// time it is opened on a store.
    pub fn open(
        config: LedgerConfig,
        store: Arc<dyn KvStore>,
        roles: Arc<dyn RoleStore>,
        events: Arc<EventBus>,
    ) -> Result<Self, PegError> {
        config.validate()?;
        let keys = LedgerKeys::new(&config.symbol);
        let ledger = Self {
            pausable: Pausable::new(config.symbol.clone()),
            writer: WriterLock::new(format!("ledger/{}", config.symbol)),
            config,
            store,
            roles,
            events,
            keys,
        };
        ledger.initialize()?;
        Ok(ledger)
    }

    fn initialize(&self) -> Result<(), PegError> {
        let _guard = self.writer.lock();
        if self.store.get_flag(&self.keys.initialized())? {
            return Ok(());
        }
        let mut txn = Txn::new(self.store.as_ref());
        if let Some(treasury) = self.config.treasury {
            let genesis = self.config.genesis_supply;
            txn.put_u128(self.keys.balance(&treasury), genesis);
            txn.put_u128(self.keys.supply(), genesis);
            if genesis > 0 {
                txn.emit(self.transfer_event(Address::ZERO, treasury, genesis));
            }
        }
        txn.put_flag(self.keys.initialized(), true);
        txn.commit(&self.events)?;
        tracing::info!(
            ledger = %self.config.symbol,
            variant = ?self.config.variant,
            genesis = self.config.genesis_supply,
            "ledger initialized"
        );
        Ok(())
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    pub fn variant(&self) -> LedgerVariant {
        self.config.variant
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn treasury(&self) -> Option<Address> {
        self.config.treasury
    }

    pub fn roles(&self) -> &Arc<dyn RoleStore> {
        &self.roles
    }

    /// Lock to hold while staging `*_in` calls into a shared transaction.
    pub fn writer(&self) -> &WriterLock {
        &self.writer
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn balance_of(&self, account: &Address) -> Result<Amount, PegError> {
        if account.is_zero() {
            return Err(PegError::invalid(format!("{}: can not view zero address", self.config.symbol)));
        }
        Ok(self.store.get_u128(&self.keys.balance(account))?)
    }

    /// Balance as seen from inside a transaction, including staged writes.
    pub fn balance_in<R: KvRead + ?Sized>(&self, reader: &R, account: &Address) -> Result<Amount, PegError> {
        Ok(reader.get_u128(&self.keys.balance(account))?)
    }

    pub fn allowance_in<R: KvRead + ?Sized>(&self, reader: &R, owner: &Address, spender: &Address) -> Result<Amount, PegError> {
        Ok(reader.get_u128(&self.keys.allowance(owner, spender))?)
    }

    pub fn total_supply(&self) -> Result<Amount, PegError> {
        Ok(self.store.get_u128(&self.keys.supply())?)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Result<Amount, PegError> {
        Ok(self.store.get_u128(&self.keys.allowance(owner, spender))?)
    }

    pub fn is_paused(&self) -> Result<bool, PegError> {
        self.pausable.is_paused(self.store.as_ref())
    }

    pub fn count_all_users(&self) -> Result<u64, PegError> {
        Ok(users::len(self.store.as_ref(), &self.keys)?)
    }

    pub fn user_at(&self, index: u64) -> Result<Option<Address>, PegError> {
        Ok(users::at(self.store.as_ref(), &self.keys, index)?)
    }

    // ── Committed operations ────────────────────────────────────────────

    pub fn mint(&self, caller: &Address, to: &Address, amount: Amount) -> Result<(), PegError> {
        self.run("mint", |txn| self.mint_in(txn, caller, to, amount))?;
        tracing::info!(ledger = %self.config.symbol, %to, amount, "minted");
        Ok(())
    }

    pub fn burn(&self, caller: &Address, amount: Amount) -> Result<(), PegError> {
        self.run("burn", |txn| self.burn_in(txn, caller, amount))?;
        tracing::info!(ledger = %self.config.symbol, from = %caller, amount, "burned");
        Ok(())
    }

    pub fn burn_from(&self, caller: &Address, account: &Address, amount: Amount) -> Result<(), PegError> {
        self.run("burn_from", |txn| self.burn_from_in(txn, caller, account, amount))?;
        tracing::info!(ledger = %self.config.symbol, from = %account, by = %caller, amount, "burned");
        Ok(())
    }

    pub fn transfer(&self, caller: &Address, to: &Address, amount: Amount) -> Result<(), PegError> {
        self.run("transfer", |txn| self.transfer_in(txn, caller, to, amount))
    }

    pub fn transfer_from(&self, caller: &Address, from: &Address, to: &Address, amount: Amount) -> Result<(), PegError> {
        self.run("transfer_from", |txn| self.transfer_from_in(txn, caller, from, to, amount))
    }

    pub fn deduct_from(&self, caller: &Address, account: &Address, amount: Amount) -> Result<(), PegError> {
        self.run("deduct_from", |txn| self.deduct_from_in(txn, caller, account, amount))?;
        tracing::info!(ledger = %self.config.symbol, from = %account, amount, "deducted to treasury");
        Ok(())
    }

    pub fn approve(&self, caller: &Address, spender: &Address, amount: Amount) -> Result<(), PegError> {
        self.run("approve", |txn| self.approve_in(txn, caller, spender, amount))
    }

    pub fn pause(&self, caller: &Address) -> Result<(), PegError> {
        self.run("pause", |txn| self.pausable.pause_in(txn, self.roles.as_ref(), caller))
    }

    pub fn unpause(&self, caller: &Address) -> Result<(), PegError> {
        self.run("unpause", |txn| self.pausable.unpause_in(txn, self.roles.as_ref(), caller))
    }

    /// Lock, stage, commit. Rejections are logged at debug level and leave
    /// the store untouched.
    pub(crate) fn run<T>(
        &self,
        op: &'static str,
        stage: impl FnOnce(&mut Txn<'_>) -> Result<T, PegError>,
    ) -> Result<T, PegError> {
        let _guard = self.writer.lock();
        let mut txn = Txn::new(self.store.as_ref());
        match stage(&mut txn) {
            Ok(out) => {
                txn.commit(&self.events)?;
                Ok(out)
            }
            Err(e) => {
                tracing::debug!(ledger = %self.config.symbol, op, error = %e, "rejected");
                Err(e)
            }
        }
    }

    // ── Staged operations ───────────────────────────────────────────────

    /// Open: `MINTER`. Restricted: `OPERATOR`, and never to the treasury.
    pub fn mint_in(&self, txn: &mut Txn<'_>, caller: &Address, to: &Address, amount: Amount) -> Result<(), PegError> {
        self.pausable.ensure_not_paused(&*txn)?;
        match self.config.variant {
            LedgerVariant::Open => self.roles.ensure_role(Role::Minter, caller)?,
            LedgerVariant::Restricted => self.roles.ensure_role(Role::Operator, caller)?,
        }
        if to.is_zero() {
            return Err(PegError::invalid("mint: cannot mint to the zero address"));
        }
        if amount == 0 {
            return Err(PegError::invalid("mint: cannot mint zero token"));
        }
        if self.is_treasury(to) {
            return Err(PegError::invalid("mint: cannot mint to the treasury"));
        }
        self.credit(txn, to, amount)?;
        self.adjust_supply(txn, amount, true)?;
        txn.emit(self.transfer_event(Address::ZERO, *to, amount));
        Ok(())
    }

    /// Open: any holder burns its own balance. Restricted: treasury only.
    pub fn burn_in(&self, txn: &mut Txn<'_>, caller: &Address, amount: Amount) -> Result<(), PegError> {
        self.pausable.ensure_not_paused(&*txn)?;
        if self.config.variant == LedgerVariant::Restricted && !self.is_treasury(caller) {
            return Err(PegError::NotAllowed("burn: only the treasury can burn".into()));
        }
        if amount == 0 {
            return Err(PegError::invalid("burn: cannot burn zero amount"));
        }
        self.debit(txn, caller, amount, "burn")?;
        self.adjust_supply(txn, amount, false)?;
        txn.emit(self.transfer_event(*caller, Address::ZERO, amount));
        Ok(())
    }

    /// Restricted: `OPERATOR` burns from any user except the treasury.
    /// Open: spends the caller's allowance over `account`.
    pub fn burn_from_in(&self, txn: &mut Txn<'_>, caller: &Address, account: &Address, amount: Amount) -> Result<(), PegError> {
        self.pausable.ensure_not_paused(&*txn)?;
        if self.config.variant == LedgerVariant::Restricted {
            self.roles.ensure_role(Role::Operator, caller)?;
        }
        if account.is_zero() {
            return Err(PegError::invalid("burnFrom: cannot burn from the zero address"));
        }
        if amount == 0 {
            return Err(PegError::invalid("burnFrom: cannot burn zero token"));
        }
        match self.config.variant {
            LedgerVariant::Restricted => {
                if self.is_treasury(account) {
                    return Err(PegError::invalid("burnFrom: user address must not be company address"));
                }
            }
            LedgerVariant::Open => self.spend_allowance(txn, account, caller, amount, "burnFrom")?,
        }
        self.debit(txn, account, amount, "burnFrom")?;
        self.adjust_supply(txn, amount, false)?;
        txn.emit(self.transfer_event(*account, Address::ZERO, amount));
        Ok(())
    }

    /// Restricted: `OPERATOR` pays out of the treasury. Open: the caller
    /// moves its own funds.
    pub fn transfer_in(&self, txn: &mut Txn<'_>, caller: &Address, to: &Address, amount: Amount) -> Result<(), PegError> {
        self.pausable.ensure_not_paused(&*txn)?;
        let from = match (self.config.variant, self.config.treasury) {
            (LedgerVariant::Restricted, Some(treasury)) => {
                self.roles.ensure_role(Role::Operator, caller)?;
                treasury
            }
            _ => *caller,
        };
        if to.is_zero() {
            return Err(PegError::invalid("transfer: cannot transfer to the zero address"));
        }
        if amount == 0 {
            return Err(PegError::invalid("transfer: cannot transfer zero token"));
        }
        if self.config.variant == LedgerVariant::Restricted && self.is_treasury(to) {
            return Err(PegError::invalid("transfer: cannot transfer to company address"));
        }
        self.move_funds(txn, &from, to, amount, "transfer")
    }

    /// Delegated transfer. Never allowed on the restricted variant.
    pub fn transfer_from_in(
        &self,
        txn: &mut Txn<'_>,
        caller: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), PegError> {
        self.pausable.ensure_not_paused(&*txn)?;
        if self.config.variant == LedgerVariant::Restricted {
            return Err(PegError::NotAllowed("transferFrom is not allowed".into()));
        }
        if from.is_zero() || to.is_zero() {
            return Err(PegError::invalid("transferFrom: zero address"));
        }
        if amount == 0 {
            return Err(PegError::invalid("transferFrom: cannot transfer zero token"));
        }
        self.spend_allowance(txn, from, caller, amount, "transferFrom")?;
        self.move_funds(txn, from, to, amount, "transferFrom")
    }

    /// Restricted only: `OPERATOR` moves a user's funds back to the treasury.
    pub fn deduct_from_in(&self, txn: &mut Txn<'_>, caller: &Address, account: &Address, amount: Amount) -> Result<(), PegError> {
        self.pausable.ensure_not_paused(&*txn)?;
        let Some(treasury) = self.restricted_treasury() else {
            return Err(PegError::NotAllowed("deductFrom is not allowed".into()));
        };
        self.roles.ensure_role(Role::Operator, caller)?;
        if account.is_zero() {
            return Err(PegError::invalid("deductFrom: cannot deduct from the zero address"));
        }
        if amount == 0 {
            return Err(PegError::invalid("deductFrom: cannot deduct zero token"));
        }
        if *account == treasury {
            return Err(PegError::invalid("deductFrom: user address must not be company address"));
        }
        self.move_funds(txn, account, &treasury, amount, "deductFrom")
    }

    /// Set the allowance `spender` may draw from the caller. `u128::MAX`
    /// is an infinite allowance that is never decremented.
    pub fn approve_in(&self, txn: &mut Txn<'_>, caller: &Address, spender: &Address, amount: Amount) -> Result<(), PegError> {
        self.pausable.ensure_not_paused(&*txn)?;
        if caller.is_zero() || spender.is_zero() {
            return Err(PegError::invalid("approve: zero address"));
        }
        txn.put_u128(self.keys.allowance(caller, spender), amount);
        txn.emit(PegEvent::Approval {
            ledger: self.config.symbol.clone(),
            owner: *caller,
            spender: *spender,
            amount,
        });
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────────

    pub(crate) fn is_treasury(&self, account: &Address) -> bool {
        self.config.treasury.as_ref() == Some(account)
    }

    fn restricted_treasury(&self) -> Option<Address> {
        match self.config.variant {
            LedgerVariant::Restricted => self.config.treasury,
            LedgerVariant::Open => None,
        }
    }

    fn move_funds(&self, txn: &mut Txn<'_>, from: &Address, to: &Address, amount: Amount, context: &str) -> Result<(), PegError> {
        self.debit(txn, from, amount, context)?;
        self.credit(txn, to, amount)?;
        txn.emit(self.transfer_event(*from, *to, amount));
        Ok(())
    }

    pub(crate) fn credit(&self, txn: &mut Txn<'_>, account: &Address, amount: Amount) -> Result<(), PegError> {
        let key = self.keys.balance(account);
        let balance = txn.get_u128(&key)?;
        let updated = balance
            .checked_add(amount)
            .ok_or_else(|| PegError::overflow(format!("{} balance", self.config.symbol)))?;
        txn.put_u128(key, updated);
        if updated > 0 && !self.is_treasury(account) {
            users::register(txn, &self.keys, account)?;
        }
        Ok(())
    }

    fn debit(&self, txn: &mut Txn<'_>, account: &Address, amount: Amount, context: &str) -> Result<(), PegError> {
        let key = self.keys.balance(account);
        let balance = txn.get_u128(&key)?;
        if balance < amount {
            return Err(PegError::InsufficientBalance {
                context: format!("{}: {}", self.config.symbol, context),
                needed: amount,
                available: balance,
            });
        }
        txn.put_u128(key, balance - amount);
        Ok(())
    }

    fn adjust_supply(&self, txn: &mut Txn<'_>, amount: Amount, increase: bool) -> Result<(), PegError> {
        let key = self.keys.supply();
        let supply = txn.get_u128(&key)?;
        let updated = if increase {
            supply.checked_add(amount)
        } else {
            supply.checked_sub(amount)
        }
        .ok_or_else(|| PegError::overflow(format!("{} total supply", self.config.symbol)))?;
        txn.put_u128(key, updated);
        Ok(())
    }

    fn spend_allowance(
        &self,
        txn: &mut Txn<'_>,
        owner: &Address,
        spender: &Address,
        amount: Amount,
        context: &str,
    ) -> Result<(), PegError> {
        let key = self.keys.allowance(owner, spender);
        let current = txn.get_u128(&key)?;
        if current == Amount::MAX {
            return Ok(());
        }
        if current < amount {
            return Err(PegError::InsufficientAllowance {
                context: format!("{}: {}", self.config.symbol, context),
                needed: amount,
                available: current,
            });
        }
        txn.put_u128(key, current - amount);
        Ok(())
    }

    pub(crate) fn transfer_event(&self, from: Address, to: Address, amount: Amount) -> PegEvent {
        PegEvent::Transfer {
            ledger: self.config.symbol.clone(),
            from,
            to,
            amount,
        }
    }
}
