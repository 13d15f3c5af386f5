//! Domain events emitted after a state change commits.

use std::sync::RwLock;

use crate::{Address, Amount, Role};

/// Which way a redemption swapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedemptionKind {
    /// Reserve asset burned, pegged asset minted.
    ReserveToPegged,
    /// Pegged asset burned, reserve asset minted.
    PeggedToReserve,
}

/// Events that observers can subscribe to via the [`EventBus`].
///
/// Mints are transfers from [`Address::ZERO`], burns are transfers to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PegEvent {
    Transfer {
        ledger: String,
        from: Address,
        to: Address,
        amount: Amount,
    },
    Approval {
        ledger: String,
        owner: Address,
        spender: Address,
        amount: Amount,
    },
    Rebased {
        ledger: String,
        dividend: u128,
        divisor: u128,
        from_index: u64,
        to_index: u64,
        total_supply: Amount,
    },
    Paused {
        scope: String,
        by: Address,
    },
    Unpaused {
        scope: String,
        by: Address,
    },
    RoleGranted {
        scope: String,
        role: Role,
        account: Address,
        sender: Address,
    },
    RoleRevoked {
        scope: String,
        role: Role,
        account: Address,
        sender: Address,
    },
    Redeemed {
        kind: RedemptionKind,
        account: Address,
        burned: Amount,
        minted: Amount,
    },
    Staked {
        scope: String,
        pool: u32,
        account: Address,
        amount: Amount,
    },
    Withdrawn {
        scope: String,
        pool: u32,
        account: Address,
        amount: Amount,
    },
    RewardPaid {
        scope: String,
        pool: u32,
        account: Address,
        amount: Amount,
    },
    PoolConfigured {
        scope: String,
        pool: u32,
        alloc_weight: u64,
        lockup_secs: u64,
    },
    LiquidityProvided {
        provider: Address,
        token: Address,
        amount_in: Amount,
        liquidity: Amount,
    },
    LpTokensWithdrawn {
        to: Address,
        amount: Amount,
    },
    FeeCollected {
        position_id: u64,
        amount0: Amount,
        amount1: Amount,
    },
}

type Listener = Box<dyn Fn(&PegEvent) + Send + Sync>;

/// Synchronous fan-out event bus.
///
/// Listeners run inline on the committing thread while component writer
/// locks are still held; keep handlers fast and never call back into a
/// component from one.
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, listener: Box<dyn Fn(&PegEvent) + Send + Sync>) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    pub fn emit(&self, event: &PegEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for listener in listeners.iter() {
            listener(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    #[test]
    fn emit_calls_all_listeners() {
        let counter = Arc::new(AtomicUsize::new(0));
        let bus = EventBus::new();

        let c1 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));

        let c2 = Arc::clone(&counter);
        bus.subscribe(Box::new(move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        }));

        bus.emit(&PegEvent::Paused {
            scope: "AGC".into(),
            by: Address::from_low_u8(1),
        });

        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn emit_with_no_listeners_is_noop() {
        let bus = EventBus::new();
        bus.emit(&PegEvent::LpTokensWithdrawn {
            to: Address::from_low_u8(2),
            amount: 5,
        });
    }

    #[test]
    fn listener_sees_event_payload() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::new();
        let sink = Arc::clone(&seen);
        bus.subscribe(Box::new(move |event| {
            sink.lock().unwrap().push(event.clone());
        }));

        let event = PegEvent::Transfer {
            ledger: "USC".into(),
            from: Address::ZERO,
            to: Address::from_low_u8(3),
            amount: 42,
        };
        bus.emit(&event);
        assert_eq!(seen.lock().unwrap().as_slice(), &[event]);
    }
}
