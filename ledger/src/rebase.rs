//! Paginated rebasement.

use peg_store::{KvRead, Txn};
use peg_types::amount::mul_div_floor;
use peg_types::{Address, Amount, PegError, PegEvent, Role};

use crate::{users, Ledger, RebaseSupplyMode};

/// Result of one `perform_rebasement` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RebaseOutcome {
    /// Registered users actually rescaled by this call.
    pub accounts_scaled: u64,
    pub total_supply: Amount,
}

impl Ledger {
    /// Rescale every registered user in `[from_index, min(to_index, len))`
    /// by `dividend / divisor`, flooring each balance. Requires `OPERATOR`.
    pub fn perform_rebasement(
        &self,
        caller: &Address,
        dividend: u128,
        divisor: u128,
        from_index: u64,
        to_index: u64,
    ) -> Result<RebaseOutcome, PegError> {
        let outcome = self.run("perform_rebasement", |txn| {
            self.perform_rebasement_in(txn, caller, dividend, divisor, from_index, to_index)
        })?;
        tracing::info!(
            ledger = %self.config.symbol,
            dividend,
            divisor,
            from_index,
            to_index,
            accounts = outcome.accounts_scaled,
            total_supply = outcome.total_supply,
            "rebasement applied"
        );
        Ok(outcome)
    }

    pub fn perform_rebasement_in(
        &self,
        txn: &mut Txn<'_>,
        caller: &Address,
        dividend: u128,
        divisor: u128,
        from_index: u64,
        to_index: u64,
    ) -> Result<RebaseOutcome, PegError> {
        self.pausable.ensure_not_paused(&*txn)?;
        self.roles.ensure_role(Role::Operator, caller)?;
        if dividend == 0 {
            return Err(PegError::invalid("rebasement: dividend must not be zero"));
        }
        if divisor == 0 {
            return Err(PegError::invalid("rebasement: divisor must not be zero"));
        }
        if dividend == divisor {
            return Err(PegError::invalid("rebasement: divident must be different from divisor"));
        }
        if from_index >= to_index {
            return Err(PegError::invalid("rebasement: start index must be less than end index"));
        }

        let end = to_index.min(users::len(&*txn, &self.keys)?);
        let mut delta = SupplyDelta::default();
        let mut scaled = 0u64;
        for index in from_index..end {
            let Some(account) = users::at(&*txn, &self.keys, index)? else {
                return Err(PegError::Storage(format!(
                    "{}: user registry hole at {index}",
                    self.config.symbol
                )));
            };
            self.rescale_balance(txn, &account, dividend, divisor, &mut delta)?;
            scaled += 1;
        }

        let supply_key = self.keys.supply();
        let supply = txn.get_u128(&supply_key)?;
        let new_supply = match self.config.rebase_mode {
            RebaseSupplyMode::PerCall => {
                if let Some(treasury) = self.config.treasury {
                    self.rescale_balance(txn, &treasury, dividend, divisor, &mut delta)?;
                }
                mul_div_floor(supply, dividend, divisor)
                    .ok_or_else(|| PegError::overflow(format!("{} total supply", self.config.symbol)))?
            }
            RebaseSupplyMode::PerAccount => {
                if from_index == 0 {
                    if let Some(treasury) = self.config.treasury {
                        self.rescale_balance(txn, &treasury, dividend, divisor, &mut delta)?;
                    }
                }
                delta
                    .apply(supply)
                    .ok_or_else(|| PegError::overflow(format!("{} total supply", self.config.symbol)))?
            }
        };
        txn.put_u128(supply_key, new_supply);
        txn.emit(PegEvent::Rebased {
            ledger: self.config.symbol.clone(),
            dividend,
            divisor,
            from_index,
            to_index,
            total_supply: new_supply,
        });
        Ok(RebaseOutcome {
            accounts_scaled: scaled,
            total_supply: new_supply,
        })
    }

    fn rescale_balance(
        &self,
        txn: &mut Txn<'_>,
        account: &Address,
        dividend: u128,
        divisor: u128,
        delta: &mut SupplyDelta,
    ) -> Result<(), PegError> {
        let key = self.keys.balance(account);
        let balance = txn.get_u128(&key)?;
        let scaled = mul_div_floor(balance, dividend, divisor)
            .ok_or_else(|| PegError::overflow(format!("{} balance of {account}", self.config.symbol)))?;
        delta.record(balance, scaled)?;
        txn.put_u128(key, scaled);
        Ok(())
    }
}

/// Net change of the balances touched by one call.
#[derive(Default)]
struct SupplyDelta {
    added: Amount,
    removed: Amount,
}

impl SupplyDelta {
    fn record(&mut self, before: Amount, after: Amount) -> Result<(), PegError> {
        let (slot, diff) = if after >= before {
            (&mut self.added, after - before)
        } else {
            (&mut self.removed, before - after)
        };
        *slot = slot
            .checked_add(diff)
            .ok_or_else(|| PegError::overflow("rebasement delta"))?;
        Ok(())
    }

    fn apply(&self, supply: Amount) -> Option<Amount> {
        supply.checked_add(self.added)?.checked_sub(self.removed)
    }
}

#[cfg(test)]
mod tests {
    use crate::ledger::tests::{agc, fixture, sum_of_balances, ALICE, BOB, GENESIS, OPERATOR, TREASURY};
    use crate::{LedgerConfig, RebaseSupplyMode};
    use peg_types::{Address, ErrorKind};

    #[test]
    fn scales_users_treasury_and_supply() {
        let f = agc();
        f.ledger.mint(&OPERATOR, &ALICE, 500).unwrap();
        f.ledger.mint(&OPERATOR, &BOB, 400).unwrap();

        let outcome = f.ledger.perform_rebasement(&OPERATOR, 3, 2, 0, 3).unwrap();
        assert_eq!(outcome.accounts_scaled, 2);
        assert_eq!(f.ledger.balance_of(&ALICE).unwrap(), 750);
        assert_eq!(f.ledger.balance_of(&BOB).unwrap(), 600);
        assert_eq!(f.ledger.balance_of(&TREASURY).unwrap(), GENESIS * 3 / 2);
        assert_eq!(f.ledger.total_supply().unwrap(), (GENESIS + 900) * 3 / 2);
    }

    #[test]
    fn ratio_below_one_floors() {
        let f = agc();
        f.ledger.mint(&OPERATOR, &ALICE, 501).unwrap();
        f.ledger.perform_rebasement(&OPERATOR, 1, 2, 0, 10).unwrap();
        assert_eq!(f.ledger.balance_of(&ALICE).unwrap(), 250);
    }

    #[test]
    fn argument_checks() {
        let f = agc();
        let cases = [(0, 2, 0, 1), (3, 0, 0, 1), (2, 2, 0, 1), (3, 2, 1, 1), (3, 2, 2, 1)];
        for (dividend, divisor, from, to) in cases {
            let err = f.ledger.perform_rebasement(&OPERATOR, dividend, divisor, from, to).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{dividend}/{divisor} [{from},{to})");
        }
        assert_eq!(
            f.ledger.perform_rebasement(&ALICE, 3, 2, 0, 1).unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
    }

    #[test]
    fn paused_ledger_rejects_rebasement() {
        let f = agc();
        f.ledger.pause(&crate::ledger::tests::ADMIN).unwrap();
        assert_eq!(
            f.ledger.perform_rebasement(&OPERATOR, 3, 2, 0, 1).unwrap_err().kind(),
            ErrorKind::Paused
        );
    }

    #[test]
    fn per_call_mode_rescales_supply_on_every_page() {
        let f = agc();
        f.ledger.mint(&OPERATOR, &ALICE, 500).unwrap();
        f.ledger.mint(&OPERATOR, &BOB, 400).unwrap();
        let supply_before = f.ledger.total_supply().unwrap();

        f.ledger.perform_rebasement(&OPERATOR, 3, 2, 0, 1).unwrap();
        f.ledger.perform_rebasement(&OPERATOR, 3, 2, 1, 2).unwrap();

        assert_eq!(f.ledger.balance_of(&ALICE).unwrap(), 750);
        assert_eq!(f.ledger.balance_of(&BOB).unwrap(), 600);
        assert_eq!(f.ledger.total_supply().unwrap(), supply_before * 3 / 2 * 3 / 2);
        assert_eq!(f.ledger.balance_of(&TREASURY).unwrap(), GENESIS * 3 / 2 * 3 / 2);
    }

    #[test]
    fn per_account_mode_keeps_supply_equal_to_balances() {
        let f = fixture(
            LedgerConfig::restricted("AGC", TREASURY, GENESIS).with_rebase_mode(RebaseSupplyMode::PerAccount),
        );
        f.ledger.mint(&OPERATOR, &ALICE, 500).unwrap();
        f.ledger.mint(&OPERATOR, &BOB, 400).unwrap();
        let supply_before = f.ledger.total_supply().unwrap();

        f.ledger.perform_rebasement(&OPERATOR, 3, 2, 0, 1).unwrap();
        f.ledger.perform_rebasement(&OPERATOR, 3, 2, 1, 2).unwrap();

        assert_eq!(f.ledger.balance_of(&ALICE).unwrap(), 750);
        assert_eq!(f.ledger.balance_of(&BOB).unwrap(), 600);
        assert_eq!(f.ledger.balance_of(&TREASURY).unwrap(), GENESIS * 3 / 2);
        assert_eq!(f.ledger.total_supply().unwrap(), supply_before * 3 / 2);
        assert_eq!(sum_of_balances(&f.ledger), f.ledger.total_supply().unwrap());
    }

    #[test]
    fn range_past_registry_end_is_clamped() {
        let f = agc();
        f.ledger.mint(&OPERATOR, &ALICE, 10).unwrap();
        let outcome = f.ledger.perform_rebasement(&OPERATOR, 2, 1, 5, 9).unwrap();
        assert_eq!(outcome.accounts_scaled, 0);
        assert_eq!(f.ledger.balance_of(&ALICE).unwrap(), 10);
    }

    #[test]
    fn open_ledger_rebases_users_only() {
        let f = crate::ledger::tests::usc();
        f.ledger.mint(&OPERATOR, &ALICE, 100).unwrap();
        f.ledger.perform_rebasement(&OPERATOR, 2, 1, 0, 1).unwrap();
        assert_eq!(f.ledger.balance_of(&ALICE).unwrap(), 200);
        assert_eq!(f.ledger.total_supply().unwrap(), 200);
        assert_eq!(f.ledger.balance_of(&Address::from_low_u8(99)).unwrap(), 0);
    }
}
