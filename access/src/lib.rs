//! Access control for pegledger components.
//!
//! - [`AccessRegistry`]: KV-backed role table, one per component scope,
//!   exposed to components through the [`RoleStore`] trait.
//! - [`Pausable`]: the two-state pause machine shared by every component.
//! - [`WriterLock`]: per-component writer mutex with a global acquisition
//!   order for operations that span several components.

pub mod pause;
pub mod registry;
pub mod writer;

pub use pause::Pausable;
pub use registry::{AccessRegistry, RoleStore};
pub use writer::{lock_all, WriterLock};
