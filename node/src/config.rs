//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use peg_ledger::RebaseSupplyMode;
use peg_types::{Address, Amount};

use crate::NodeError;

/// Role registry scope of the redemption controller.
pub const CONTROLLER_SCOPE: &str = "controller";

/// Configuration for a pegledger node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Addresses are `0x`-prefixed
/// hex strings; the defaults are fixed development accounts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory for LMDB storage.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub storage: StorageBackend,

    /// LMDB map size in MiB.
    #[serde(default = "default_map_size_mb")]
    pub lmdb_map_size_mb: usize,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Bootstrap admin of every component's role registry.
    #[serde(default = "default_admin")]
    pub admin: String,

    /// Redemption controller principal.
    #[serde(default = "default_controller")]
    pub controller: String,

    /// Restricted reserve ledger.
    #[serde(default)]
    pub reserve: LedgerSettings,

    /// Symbol of the open pegged ledger.
    #[serde(default = "default_pegged_symbol")]
    pub pegged_symbol: String,

    #[serde(default)]
    pub staking: StakingSettings,

    #[serde(default)]
    pub liquidity: LiquiditySettings,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Lmdb,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerSettings {
    #[serde(default = "default_reserve_symbol")]
    pub symbol: String,

    #[serde(default = "default_treasury")]
    pub treasury: String,

    /// Decimal string; raw units exceed TOML's integer range.
    #[serde(default = "default_genesis_supply")]
    pub genesis_supply: String,

    #[serde(default)]
    pub rebase_mode: RebaseSupplyMode,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StakingModel {
    /// Fixed yearly ROI, one pool.
    #[default]
    Simple,
    /// Weighted pools sharing a reward rate.
    Pool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StakingSettings {
    #[serde(default)]
    pub model: StakingModel,

    #[serde(default = "default_staking_scope")]
    pub scope: String,

    #[serde(default = "default_staking_principal")]
    pub principal: String,

    /// Open ledger whose tokens are staked. Rewards are minted on the
    /// pegged ledger.
    #[serde(default = "default_stake_symbol")]
    pub stake_symbol: String,

    /// Basis points per year, simple model only.
    #[serde(default = "default_roi_per_year")]
    pub roi_per_year: u64,

    /// Pool model only.
    #[serde(default = "default_reward_per_second")]
    pub reward_per_second: u64,

    /// Pool model only.
    #[serde(default)]
    pub lock_withdraw_rewards: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LiquiditySettings {
    #[serde(default = "default_liquidity_scope")]
    pub scope: String,

    #[serde(default = "default_liquidity_principal")]
    pub principal: String,

    /// Receives withdrawn LP tokens and fees. Defaults to the admin.
    #[serde(default = "default_admin")]
    pub owner: String,

    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./peg_data")
}

fn default_map_size_mb() -> usize {
    1024
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn dev_address(seed: u8) -> String {
    Address::from_low_u8(seed).to_string()
}

fn default_admin() -> String {
    dev_address(1)
}

fn default_treasury() -> String {
    dev_address(2)
}

fn default_controller() -> String {
    dev_address(4)
}

fn default_staking_principal() -> String {
    dev_address(5)
}

fn default_liquidity_principal() -> String {
    dev_address(6)
}

fn default_reserve_symbol() -> String {
    "AGC".to_string()
}

fn default_pegged_symbol() -> String {
    "USC".to_string()
}

fn default_stake_symbol() -> String {
    "USDT".to_string()
}

/// 30 million tokens at 18 decimals.
fn default_genesis_supply() -> String {
    (30_000_000u128 * 10u128.pow(18)).to_string()
}

fn default_staking_scope() -> String {
    "staking".to_string()
}

fn default_liquidity_scope() -> String {
    "liquidity".to_string()
}

fn default_roi_per_year() -> u64 {
    2000
}

fn default_reward_per_second() -> u64 {
    1
}

fn default_slippage_bps() -> u32 {
    peg_liquidity::DEFAULT_SLIPPAGE_BPS
}

// ── Impl ───────────────────────────────────────────────────────────────

/// Parse a config address, naming the field on failure.
pub(crate) fn parse_address(field: &str, value: &str) -> Result<Address, NodeError> {
    let address = Address::from_hex(value).map_err(|e| NodeError::Config(format!("{field}: {e}")))?;
    if address.is_zero() {
        return Err(NodeError::Config(format!("{field}: zero address")));
    }
    Ok(address)
}

impl LedgerSettings {
    pub fn genesis_supply_amount(&self) -> Result<Amount, NodeError> {
        self.genesis_supply
            .parse::<Amount>()
            .map_err(|e| NodeError::Config(format!("reserve.genesis_supply: {e}")))
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// In-memory storage, for tests and throwaway runs.
    pub fn in_memory() -> Self {
        Self {
            storage: StorageBackend::Memory,
            ..Self::default()
        }
    }

    /// Check everything `PegNode::from_config` will parse.
    pub fn validate(&self) -> Result<(), NodeError> {
        parse_address("admin", &self.admin)?;
        parse_address("controller", &self.controller)?;
        parse_address("reserve.treasury", &self.reserve.treasury)?;
        parse_address("staking.principal", &self.staking.principal)?;
        parse_address("liquidity.principal", &self.liquidity.principal)?;
        parse_address("liquidity.owner", &self.liquidity.owner)?;
        self.reserve.genesis_supply_amount()?;
        self.log_format.parse::<crate::LogFormat>()?;
        // Each ledger symbol and component scope owns one role registry.
        let scopes = [
            self.reserve.symbol.as_str(),
            self.pegged_symbol.as_str(),
            self.staking.stake_symbol.as_str(),
            CONTROLLER_SCOPE,
            self.staking.scope.as_str(),
            self.liquidity.scope.as_str(),
        ];
        for (i, scope) in scopes.iter().enumerate() {
            if scope.is_empty() || scope.contains('/') {
                return Err(NodeError::Config(format!("scope {scope:?} must be a single non-empty segment")));
            }
            if scopes[..i].contains(scope) {
                return Err(NodeError::Config(format!("scope {scope} is used twice")));
            }
        }
        if self.liquidity.slippage_bps > peg_liquidity::MAX_SLIPPAGE_BPS {
            return Err(NodeError::Config(format!(
                "liquidity.slippage_bps: {} exceeds {}",
                self.liquidity.slippage_bps,
                peg_liquidity::MAX_SLIPPAGE_BPS
            )));
        }
        Ok(())
    }
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            symbol: default_reserve_symbol(),
            treasury: default_treasury(),
            genesis_supply: default_genesis_supply(),
            rebase_mode: RebaseSupplyMode::default(),
        }
    }
}

impl Default for StakingSettings {
    fn default() -> Self {
        Self {
            model: StakingModel::default(),
            scope: default_staking_scope(),
            principal: default_staking_principal(),
            stake_symbol: default_stake_symbol(),
            roi_per_year: default_roi_per_year(),
            reward_per_second: default_reward_per_second(),
            lock_withdraw_rewards: false,
        }
    }
}

impl Default for LiquiditySettings {
    fn default() -> Self {
        Self {
            scope: default_liquidity_scope(),
            principal: default_liquidity_principal(),
            owner: default_admin(),
            slippage_bps: default_slippage_bps(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            storage: StorageBackend::default(),
            lmdb_map_size_mb: default_map_size_mb(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            admin: default_admin(),
            controller: default_controller(),
            reserve: LedgerSettings::default(),
            pegged_symbol: default_pegged_symbol(),
            staking: StakingSettings::default(),
            liquidity: LiquiditySettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.reserve.genesis_supply, config.reserve.genesis_supply);
        assert_eq!(parsed.staking.roi_per_year, config.staking.roi_per_year);
        assert_eq!(parsed.storage, StorageBackend::Lmdb);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.log_format, "human");
        assert_eq!(config.reserve.symbol, "AGC");
        assert_eq!(config.pegged_symbol, "USC");
        assert_eq!(config.staking.model, StakingModel::Simple);
        assert_eq!(config.liquidity.slippage_bps, 50);
        assert_eq!(config.reserve.genesis_supply_amount().unwrap(), 30_000_000 * 10u128.pow(18));
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            storage = "memory"

            [reserve]
            rebase_mode = "per_account"

            [staking]
            model = "pool"
            lock_withdraw_rewards = true
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.reserve.rebase_mode, RebaseSupplyMode::PerAccount);
        assert_eq!(config.reserve.symbol, "AGC"); // default
        assert_eq!(config.staking.model, StakingModel::Pool);
        assert!(config.staking.lock_withdraw_rewards);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = NodeConfig::default();
        config.admin = "0x1234".into();
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));

        let mut config = NodeConfig::default();
        config.reserve.treasury = Address::ZERO.to_string();
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.staking.stake_symbol = "USC".into();
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.liquidity.slippage_bps = 501;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.reserve.genesis_supply = "lots".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_shared_scopes() {
        assert!(NodeConfig::default().validate().is_ok());

        let mut config = NodeConfig::default();
        config.pegged_symbol = CONTROLLER_SCOPE.into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("scope controller is used twice"));

        let mut config = NodeConfig::default();
        config.liquidity.scope = config.staking.scope.clone();
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));

        let mut config = NodeConfig::default();
        config.staking.scope = config.reserve.symbol.clone();
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.liquidity.scope = "lp/main".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_returns_io_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/peg.toml");
        assert!(matches!(result, Err(NodeError::Io(_))));
    }
}
