//! Ledger configuration.

use serde::{Deserialize, Serialize};

use peg_types::{Address, Amount, PegError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerVariant {
    /// Treasury-backed reserve asset. Operators mint, move and reclaim
    /// value; holders cannot transfer.
    Restricted,
    /// Freely transferable asset with allowances.
    Open,
}

/// How `perform_rebasement` adjusts the total supply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebaseSupplyMode {
    /// Scale the treasury and the total supply by the ratio on every call,
    /// whatever the page boundaries. A campaign split over several pages
    /// rescales the supply once per page.
    #[default]
    PerCall,
    /// Adjust the supply by the sum of the balance deltas actually applied.
    /// The treasury is rescaled with the page starting at index 0, so a
    /// paginated campaign rescales everything exactly once and the supply
    /// always equals the sum of balances.
    PerAccount,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerConfig {
    pub symbol: String,
    pub variant: LedgerVariant,
    pub treasury: Option<Address>,
    pub genesis_supply: Amount,
    pub rebase_mode: RebaseSupplyMode,
}

impl LedgerConfig {
    pub fn restricted(symbol: impl Into<String>, treasury: Address, genesis_supply: Amount) -> Self {
        Self {
            symbol: symbol.into(),
            variant: LedgerVariant::Restricted,
            treasury: Some(treasury),
            genesis_supply,
            rebase_mode: RebaseSupplyMode::PerCall,
        }
    }

    pub fn open(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            variant: LedgerVariant::Open,
            treasury: None,
            genesis_supply: 0,
            rebase_mode: RebaseSupplyMode::PerCall,
        }
    }

    pub fn with_rebase_mode(mut self, mode: RebaseSupplyMode) -> Self {
        self.rebase_mode = mode;
        self
    }

    pub fn validate(&self) -> Result<(), PegError> {
        if self.symbol.is_empty() || self.symbol.contains('/') {
            return Err(PegError::invalid(format!("invalid ledger symbol {:?}", self.symbol)));
        }
        match (self.variant, self.treasury) {
            (LedgerVariant::Restricted, None) => {
                Err(PegError::invalid("restricted ledger requires a treasury"))
            }
            (LedgerVariant::Restricted, Some(t)) if t.is_zero() => {
                Err(PegError::invalid("treasury must not be the zero address"))
            }
            (LedgerVariant::Open, Some(_)) => Err(PegError::invalid("open ledger has no treasury")),
            (LedgerVariant::Open, None) if self.genesis_supply > 0 => {
                Err(PegError::invalid("open ledger cannot have a genesis supply"))
            }
            _ => Ok(()),
        }
    }
}
