//! Redemption controller.
//!
//! Swaps value between the reserve ledger (restricted variant) and the
//! pegged ledger (open variant) for a user. Each redemption burns on one
//! ledger and mints on the other inside a single transaction.

pub mod controller;

pub use controller::RedemptionController;
