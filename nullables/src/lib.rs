//! Nullable infrastructure for deterministic testing.
//!
//! External collaborators (clock, storage, DEX) sit behind traits. The
//! implementations here return deterministic values, can be steered from
//! tests, and never touch the filesystem or network.

pub mod clock;
pub mod dex;
pub mod store;

pub use clock::NullClock;
pub use dex::NullDex;
pub use store::NullStore;
