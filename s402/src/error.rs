//! Error types for s402 payment operations.

use std::fmt;

use s402_proto::{ErrorReason, VerifyResponse};

/// Base error type for payment operations.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// Error during payment verification.
    #[error("{0}")]
    Verify(#[from] VerifyError),

    /// Error during payment settlement.
    #[error("{0}")]
    Settle(#[from] SettleError),

    /// Failure talking to a store or ledger endpoint. Never carries the
    /// underlying transport detail across the API boundary.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// A verification failure with its taxonomy reason.
#[derive(Debug, Clone)]
pub struct VerifyError {
    /// Machine-readable reason.
    pub reason: ErrorReason,
    /// The payer's account id, if it was identified before the failure.
    pub payer: Option<String>,
}

impl VerifyError {
    /// Creates a new verification error.
    #[must_use]
    pub const fn new(reason: ErrorReason) -> Self {
        Self {
            reason,
            payer: None,
        }
    }

    /// Attaches the payer's account id.
    #[must_use]
    pub fn with_payer(mut self, payer: impl Into<String>) -> Self {
        self.payer = Some(payer.into());
        self
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for VerifyError {}

impl From<ErrorReason> for VerifyError {
    fn from(reason: ErrorReason) -> Self {
        Self::new(reason)
    }
}

impl From<VerifyError> for VerifyResponse {
    fn from(err: VerifyError) -> Self {
        match err.payer {
            Some(payer) => Self::invalid_with_payer(err.reason, payer),
            None => Self::invalid(err.reason),
        }
    }
}

/// A settlement failure with its taxonomy reason.
#[derive(Debug, Clone)]
pub struct SettleError {
    /// Machine-readable reason.
    pub reason: ErrorReason,
    /// Hash of the transaction, if one was computed before the failure.
    pub transaction: Option<String>,
    /// The payer's account id, if known.
    pub payer: Option<String>,
}

impl SettleError {
    /// Creates a new settlement error.
    #[must_use]
    pub const fn new(reason: ErrorReason) -> Self {
        Self {
            reason,
            transaction: None,
            payer: None,
        }
    }

    /// Attaches the transaction hash.
    #[must_use]
    pub fn with_transaction(mut self, tx: impl Into<String>) -> Self {
        self.transaction = Some(tx.into());
        self
    }

    /// Attaches the payer's account id.
    #[must_use]
    pub fn with_payer(mut self, payer: impl Into<String>) -> Self {
        self.payer = Some(payer.into());
        self
    }
}

impl fmt::Display for SettleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for SettleError {}

impl From<ErrorReason> for SettleError {
    fn from(reason: ErrorReason) -> Self {
        Self::new(reason)
    }
}
