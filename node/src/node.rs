use std::collections::BTreeMap;
use std::sync::Arc;

use peg_access::AccessRegistry;
use peg_controller::RedemptionController;
use peg_ledger::{Ledger, LedgerConfig};
use peg_liquidity::{LiquidityAutoProvider, LiquidityConfig};
use peg_nullables::NullStore;
use peg_staking::{PoolStaking, PoolStakingConfig, SimpleStaking, SimpleStakingConfig, StakingEngine};
use peg_store::KvStore;
use peg_store_lmdb::{LmdbConfig, LmdbStore};
use peg_types::{Address, Clock, DexRouter, EventBus, Role, SystemClock};
use peg_utils::format_amount;

use crate::config::{parse_address, NodeConfig, StakingModel, StorageBackend, CONTROLLER_SCOPE};
use crate::NodeError;

/// Decimals used when logging reserve amounts.
const DISPLAY_DECIMALS: u32 = 18;

/// The configured staking engine.
pub enum StakingHandle {
    Simple(SimpleStaking),
    Pool(PoolStaking),
}

impl StakingHandle {
    pub fn engine(&self) -> &dyn StakingEngine {
        match self {
            StakingHandle::Simple(engine) => engine,
            StakingHandle::Pool(engine) => engine,
        }
    }

    pub fn as_simple(&self) -> Option<&SimpleStaking> {
        match self {
            StakingHandle::Simple(engine) => Some(engine),
            StakingHandle::Pool(_) => None,
        }
    }

    pub fn as_pool(&self) -> Option<&PoolStaking> {
        match self {
            StakingHandle::Pool(engine) => Some(engine),
            StakingHandle::Simple(_) => None,
        }
    }
}

/// All components of one deployment, sharing a store and an event bus.
pub struct PegNode {
    config: NodeConfig,
    admin: Address,
    store: Arc<dyn KvStore>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    registries: BTreeMap<String, Arc<AccessRegistry>>,
    reserve: Arc<Ledger>,
    pegged: Arc<Ledger>,
    stake_token: Arc<Ledger>,
    controller: RedemptionController,
    staking: StakingHandle,
    liquidity: Option<LiquidityAutoProvider>,
}

impl PegNode {
    /// Open every component with the wall clock.
    pub fn from_config(config: NodeConfig) -> Result<Self, NodeError> {
        Self::from_config_with_clock(config, Arc::new(SystemClock))
    }

    /// Open the store, the ledgers, the controller and the staking engine.
    /// Each component principal is granted the roles it needs only when its
    /// registry is bootstrapped, so reopening a store keeps every later
    /// grant, revoke and renounce.
    pub fn from_config_with_clock(config: NodeConfig, clock: Arc<dyn Clock>) -> Result<Self, NodeError> {
        config.validate()?;
        let admin = parse_address("admin", &config.admin)?;
        let controller_principal = parse_address("controller", &config.controller)?;
        let staking_principal = parse_address("staking.principal", &config.staking.principal)?;
        let treasury = parse_address("reserve.treasury", &config.reserve.treasury)?;

        let store: Arc<dyn KvStore> = match config.storage {
            StorageBackend::Memory => Arc::new(NullStore::new()),
            StorageBackend::Lmdb => {
                let lmdb_config = LmdbConfig {
                    map_size: config.lmdb_map_size_mb * 1024 * 1024,
                    ..LmdbConfig::default()
                };
                Arc::new(LmdbStore::open(&config.data_dir, &lmdb_config)?)
            }
        };
        let events = Arc::new(EventBus::new());
        let mut registries = BTreeMap::new();

        let (reserve_roles, fresh) = open_registry(&mut registries, &config.reserve.symbol, admin, &store, &events)?;
        if fresh {
            reserve_roles.grant_role(&admin, Role::Pauser, &admin)?;
            reserve_roles.grant_role(&admin, Role::Operator, &controller_principal)?;
        }
        let reserve = Arc::new(Ledger::open(
            LedgerConfig::restricted(
                config.reserve.symbol.clone(),
                treasury,
                config.reserve.genesis_supply_amount()?,
            )
            .with_rebase_mode(config.reserve.rebase_mode),
            Arc::clone(&store),
            reserve_roles,
            Arc::clone(&events),
        )?);

        let (pegged_roles, fresh) = open_registry(&mut registries, &config.pegged_symbol, admin, &store, &events)?;
        if fresh {
            pegged_roles.grant_role(&admin, Role::Pauser, &admin)?;
            pegged_roles.grant_role(&admin, Role::Minter, &controller_principal)?;
            pegged_roles.grant_role(&admin, Role::Minter, &staking_principal)?;
        }
        let pegged = Arc::new(Ledger::open(
            LedgerConfig::open(config.pegged_symbol.clone()),
            Arc::clone(&store),
            pegged_roles,
            Arc::clone(&events),
        )?);

        let (stake_roles, fresh) = open_registry(&mut registries, &config.staking.stake_symbol, admin, &store, &events)?;
        if fresh {
            stake_roles.grant_role(&admin, Role::Pauser, &admin)?;
        }
        let stake_token = Arc::new(Ledger::open(
            LedgerConfig::open(config.staking.stake_symbol.clone()),
            Arc::clone(&store),
            stake_roles,
            Arc::clone(&events),
        )?);

        let (controller_roles, fresh) = open_registry(&mut registries, CONTROLLER_SCOPE, admin, &store, &events)?;
        if fresh {
            controller_roles.grant_role(&admin, Role::Pauser, &admin)?;
        }
        let controller = RedemptionController::new(
            controller_principal,
            Arc::clone(&reserve),
            Arc::clone(&pegged),
            controller_roles,
            Arc::clone(&store),
            Arc::clone(&events),
        )?;

        let (staking_roles, fresh) = open_registry(&mut registries, &config.staking.scope, admin, &store, &events)?;
        if fresh {
            staking_roles.grant_role(&admin, Role::Pauser, &admin)?;
        }
        let staking = match config.staking.model {
            StakingModel::Simple => StakingHandle::Simple(SimpleStaking::new(
                SimpleStakingConfig {
                    scope: config.staking.scope.clone(),
                    principal: staking_principal,
                    roi_per_year: config.staking.roi_per_year,
                },
                Arc::clone(&stake_token),
                Arc::clone(&pegged),
                Arc::clone(&store),
                staking_roles,
                Arc::clone(&events),
                Arc::clone(&clock),
            )?),
            StakingModel::Pool => StakingHandle::Pool(PoolStaking::new(
                PoolStakingConfig {
                    scope: config.staking.scope.clone(),
                    principal: staking_principal,
                    reward_per_second: u128::from(config.staking.reward_per_second),
                    lock_withdraw_rewards: config.staking.lock_withdraw_rewards,
                },
                vec![Arc::clone(&stake_token)],
                Arc::clone(&pegged),
                Arc::clone(&store),
                staking_roles,
                Arc::clone(&events),
                Arc::clone(&clock),
            )?),
        };

        tracing::info!(
            backend = ?config.storage,
            reserve = %reserve.symbol(),
            pegged = %pegged.symbol(),
            stake = %stake_token.symbol(),
            staking = ?config.staking.model,
            reserve_supply = %format_amount(reserve.total_supply()?, DISPLAY_DECIMALS),
            "node opened"
        );

        Ok(Self {
            config,
            admin,
            store,
            events,
            clock,
            registries,
            reserve,
            pegged,
            stake_token,
            controller,
            staking,
            liquidity: None,
        })
    }

    /// Attach a liquidity provider over `dex`. `tokens` binds each DEX
    /// token address to the symbol of a ledger opened by this node.
    pub fn attach_liquidity(
        &mut self,
        dex: Arc<dyn DexRouter>,
        tokens: &[(Address, &str)],
    ) -> Result<&LiquidityAutoProvider, NodeError> {
        let settings = &self.config.liquidity;
        let principal = parse_address("liquidity.principal", &settings.principal)?;
        let owner = parse_address("liquidity.owner", &settings.owner)?;
        let mut bindings = Vec::with_capacity(tokens.len());
        for (address, symbol) in tokens {
            let ledger = self
                .ledger(symbol)
                .ok_or_else(|| NodeError::Config(format!("liquidity token {symbol} has no ledger")))?;
            bindings.push((*address, Arc::clone(ledger)));
        }
        let scope = settings.scope.clone();
        let (roles, fresh) = open_registry(&mut self.registries, &scope, self.admin, &self.store, &self.events)?;
        if fresh {
            roles.grant_role(&self.admin, Role::Pauser, &self.admin)?;
        }
        let provider = LiquidityAutoProvider::new(
            LiquidityConfig {
                scope,
                principal,
                owner,
                slippage_bps: self.config.liquidity.slippage_bps,
            },
            bindings,
            dex,
            roles,
            Arc::clone(&self.store),
            Arc::clone(&self.events),
        )?;
        tracing::info!(principal = %principal, owner = %owner, "liquidity provider attached");
        Ok(self.liquidity.insert(provider))
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn reserve(&self) -> &Arc<Ledger> {
        &self.reserve
    }

    pub fn pegged(&self) -> &Arc<Ledger> {
        &self.pegged
    }

    pub fn stake_token(&self) -> &Arc<Ledger> {
        &self.stake_token
    }

    pub fn ledger(&self, symbol: &str) -> Option<&Arc<Ledger>> {
        [&self.reserve, &self.pegged, &self.stake_token]
            .into_iter()
            .find(|ledger| ledger.symbol() == symbol)
    }

    /// Role registry of a ledger symbol or component scope.
    pub fn registry(&self, scope: &str) -> Option<&Arc<AccessRegistry>> {
        self.registries.get(scope)
    }

    pub fn controller(&self) -> &RedemptionController {
        &self.controller
    }

    pub fn staking(&self) -> &StakingHandle {
        &self.staking
    }

    pub fn liquidity(&self) -> Option<&LiquidityAutoProvider> {
        self.liquidity.as_ref()
    }
}

/// Open the registry of `scope`. The flag is true when this call
/// bootstrapped it, which is when the wiring grants belong.
fn open_registry(
    registries: &mut BTreeMap<String, Arc<AccessRegistry>>,
    scope: &str,
    admin: Address,
    store: &Arc<dyn KvStore>,
    events: &Arc<EventBus>,
) -> Result<(Arc<AccessRegistry>, bool), NodeError> {
    if let Some(existing) = registries.get(scope) {
        return Ok((Arc::clone(existing), false));
    }
    let registry = Arc::new(AccessRegistry::new(scope, Arc::clone(store), Arc::clone(events)));
    let fresh = registry.bootstrap(&admin)?;
    registries.insert(scope.to_string(), Arc::clone(&registry));
    Ok((registry, fresh))
}
