//! Token ledger.
//!
//! One [`Ledger`] instance per asset. The `Restricted` variant models the
//! reserve asset: a treasury account holds the float and only operators
//! move value. The `Open` variant models the pegged asset and generic stake
//! tokens: holders move their own funds and delegate through allowances.
//!
//! Every mutation has two entry points: a public method that locks the
//! ledger, stages the change and commits it, and a `*_in` method that only
//! stages into a caller-owned [`peg_store::Txn`], so the redemption
//! controller and the staking engines can combine several ledgers into one
//! atomic commit.

pub mod config;
pub mod keys;
pub mod ledger;
pub mod rebase;
pub mod users;

pub use config::{LedgerConfig, LedgerVariant, RebaseSupplyMode};
pub use ledger::Ledger;
pub use rebase::RebaseOutcome;
