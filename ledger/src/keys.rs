//! Storage keys for one ledger instance.

use peg_store::Key;
use peg_types::Address;

#[derive(Clone, Debug)]
pub struct LedgerKeys {
    symbol: String,
}

impl LedgerKeys {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
        }
    }

    fn root(&self) -> Key {
        Key::new("ledger").seg(&self.symbol)
    }

    pub fn balance(&self, account: &Address) -> Vec<u8> {
        self.root().seg("bal").dir().addr(account).into_vec()
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Vec<u8> {
        self.root().seg("allow").dir().addr(owner).addr(spender).into_vec()
    }

    pub fn supply(&self) -> Vec<u8> {
        self.root().seg("supply").into_vec()
    }

    pub fn initialized(&self) -> Vec<u8> {
        self.root().seg("init").into_vec()
    }

    pub fn users_len(&self) -> Vec<u8> {
        self.root().seg("users").seg("len").into_vec()
    }

    pub fn user_at(&self, index: u64) -> Vec<u8> {
        self.root().seg("users").seg("at").dir().u64(index).into_vec()
    }

    pub fn user_pos(&self, account: &Address) -> Vec<u8> {
        self.root().seg("users").seg("pos").dir().addr(account).into_vec()
    }
}
