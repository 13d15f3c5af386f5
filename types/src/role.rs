//! Named capabilities granted to principals.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::PegError;

/// A capability checked by every privileged operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Administers every other role unless a role admin override is set.
    Admin,
    Minter,
    Pauser,
    /// Restricted-ledger operator (treasury transfers, deductions, burns,
    /// rebasement) and fee collector on the liquidity provider.
    Operator,
    Redeemer,
    Withdrawer,
    /// Kept as a grantable capability; there is no proxy upgrade path.
    Upgrader,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Admin,
        Role::Minter,
        Role::Pauser,
        Role::Operator,
        Role::Redeemer,
        Role::Withdrawer,
        Role::Upgrader,
    ];

    /// Stable one-byte code used in storage keys.
    pub fn code(&self) -> u8 {
        match self {
            Role::Admin => 0,
            Role::Minter => 1,
            Role::Pauser => 2,
            Role::Operator => 3,
            Role::Redeemer => 4,
            Role::Withdrawer => 5,
            Role::Upgrader => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.code() == code)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN_ROLE",
            Role::Minter => "MINTER_ROLE",
            Role::Pauser => "PAUSER_ROLE",
            Role::Operator => "OPERATOR_ROLE",
            Role::Redeemer => "REDEEMER_ROLE",
            Role::Withdrawer => "WITHDRAWER_ROLE",
            Role::Upgrader => "UPGRADER_ROLE",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = PegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        let name = upper.strip_suffix("_ROLE").unwrap_or(&upper);
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().strip_suffix("_ROLE") == Some(name))
            .ok_or_else(|| PegError::InvalidArgument(format!("unknown role: {s}")))
    }
}
