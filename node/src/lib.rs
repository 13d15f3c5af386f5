//! pegledger node: wires the ledgers, the redemption controller, the staking
//! engine and the liquidity provider over one store and one event bus.
//!
//! The node:
//! - Loads [`NodeConfig`] from TOML
//! - Opens the storage backend (in-memory or LMDB)
//! - Opens the reserve, pegged and stake ledgers
//! - Grants each component principal its roles when a registry is first bootstrapped
//! - Exposes the components for callers to drive

pub mod config;
pub mod error;
pub mod logging;
pub mod node;

pub use config::{
    LedgerSettings, LiquiditySettings, NodeConfig, StakingModel, StakingSettings, StorageBackend, CONTROLLER_SCOPE,
};
pub use error::NodeError;
pub use logging::{init_logging, init_logging_from_config, LogFormat};
pub use node::{PegNode, StakingHandle};
