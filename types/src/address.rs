//! Account identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::PegError;

/// A 20-byte account identifier, rendered as `0x`-prefixed hex.
///
/// The all-zero address is reserved: it is never a valid account and every
/// balance query or mutation that targets it is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address([u8; 20]);

impl Address {
    pub const LEN: usize = 20;

    /// The reserved zero address.
    pub const ZERO: Self = Self([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Deterministic address whose last byte is `seed`. Handy for fixtures.
    pub const fn from_low_u8(seed: u8) -> Self {
        let mut bytes = [0u8; 20];
        bytes[19] = seed;
        Self(bytes)
    }

    /// Parse from hex, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, PegError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let raw = hex::decode(trimmed)
            .map_err(|e| PegError::InvalidArgument(format!("invalid address {s}: {e}")))?;
        let bytes: [u8; 20] = raw.as_slice().try_into().map_err(|_| {
            PegError::InvalidArgument(format!("address {s} must be {} bytes", Self::LEN))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = PegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
