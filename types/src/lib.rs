//! Fundamental types for the pegledger workspace.
//!
//! This crate defines the types shared by every other crate: addresses,
//! amounts, roles, timestamps, the error taxonomy, domain events and the
//! boundary traits for external collaborators (clock, DEX router).

pub mod address;
pub mod amount;
pub mod dex;
pub mod error;
pub mod event;
pub mod role;
pub mod time;

pub use address::Address;
pub use amount::{Amount, BPS_DENOMINATOR, SECONDS_PER_YEAR};
pub use dex::{DexRouter, PairReserves, ZapReceipt};
pub use error::{ErrorKind, PegError};
pub use event::{EventBus, PegEvent, RedemptionKind};
pub use role::Role;
pub use time::{Clock, SystemClock, Timestamp};
