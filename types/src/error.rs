//! Error taxonomy shared by every component.

use thiserror::Error;

use crate::{Address, Amount, Role};

/// Machine-checkable failure category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,
    Paused,
    InvalidArgument,
    InsufficientBalance,
    InsufficientAllowance,
    NotAllowed,
    SlippageExceeded,
    ExceedsBalance,
    Overflow,
    Storage,
}

/// Every rejected operation surfaces one of these. None of them leave
/// partial state behind.
#[derive(Debug, Error)]
pub enum PegError {
    #[error("unauthorized: {principal} is missing {role}")]
    Unauthorized { principal: Address, role: Role },

    #[error("unauthorized: {0}")]
    Forbidden(String),

    #[error("paused: {scope} is paused")]
    Paused { scope: String },

    #[error("{scope} is not paused")]
    NotPaused { scope: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("insufficient balance: {context}: need {needed}, have {available}")]
    InsufficientBalance {
        context: String,
        needed: Amount,
        available: Amount,
    },

    #[error("insufficient allowance: {context}: need {needed}, have {available}")]
    InsufficientAllowance {
        context: String,
        needed: Amount,
        available: Amount,
    },

    #[error("not allowed: {0}")]
    NotAllowed(String),

    #[error("rewards locked until {unlock_at}s")]
    Locked { unlock_at: u64 },

    #[error("slippage protection: received {received}, minimum {minimum}")]
    SlippageExceeded { received: Amount, minimum: Amount },

    #[error("{context}: amount {requested} exceeds staked balance {staked}")]
    ExceedsBalance {
        context: String,
        requested: Amount,
        staked: Amount,
    },

    #[error("arithmetic overflow in {0}")]
    Overflow(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl PegError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PegError::Unauthorized { .. } | PegError::Forbidden(_) => ErrorKind::Unauthorized,
            PegError::Paused { .. } => ErrorKind::Paused,
            PegError::NotPaused { .. } | PegError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            PegError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            PegError::InsufficientAllowance { .. } => ErrorKind::InsufficientAllowance,
            PegError::NotAllowed(_) | PegError::Locked { .. } => ErrorKind::NotAllowed,
            PegError::SlippageExceeded { .. } => ErrorKind::SlippageExceeded,
            PegError::ExceedsBalance { .. } => ErrorKind::ExceedsBalance,
            PegError::Overflow(_) => ErrorKind::Overflow,
            PegError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        PegError::InvalidArgument(reason.into())
    }

    pub fn overflow(context: impl Into<String>) -> Self {
        PegError::Overflow(context.into())
    }
}
