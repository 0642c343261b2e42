//! The closed error-reason taxonomy.
//!
//! Every verification or settlement failure maps to exactly one of these
//! reasons. The wire form is the snake_case string; anything outside this
//! enumeration is a deserialization error, which keeps facilitators and
//! gates honest about what they report.

use serde::{Deserialize, Serialize};

/// Machine-readable reason for a failed verification or settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorReason {
    /// The payer cannot cover the payment.
    #[serde(rename = "insufficient_funds")]
    InsufficientFunds,

    /// The network tag is not handled by this facilitator.
    #[serde(rename = "invalid_network")]
    InvalidNetwork,

    /// The payload failed structural validation.
    #[serde(rename = "invalid_payload")]
    InvalidPayload,

    /// The payment requirements failed structural validation.
    #[serde(rename = "invalid_payment_requirements")]
    InvalidPaymentRequirements,

    /// The scheme is malformed.
    #[serde(rename = "invalid_scheme")]
    InvalidScheme,

    /// The payment is structurally sound but not acceptable.
    #[serde(rename = "invalid_payment")]
    InvalidPayment,

    /// The payment window has elapsed.
    #[serde(rename = "payment_expired")]
    PaymentExpired,

    /// The scheme is well-formed but not supported here.
    #[serde(rename = "unsupported_scheme")]
    UnsupportedScheme,

    /// The `x402Version` field is not a supported version.
    #[serde(rename = "invalid_x402_version")]
    InvalidX402Version,

    /// The submitted transaction is in a state that cannot be settled.
    #[serde(rename = "invalid_transaction_state")]
    InvalidTransactionState,

    /// Verification failed for a reason outside the taxonomy; details are
    /// in the facilitator's logs.
    #[serde(rename = "unexpected_verify_error")]
    UnexpectedVerifyError,

    /// Settlement failed for a reason outside the taxonomy; details are in
    /// the facilitator's logs.
    #[serde(rename = "unexpected_settle_error")]
    UnexpectedSettleError,

    /// The payload carries no signed transaction.
    #[serde(rename = "invalid_exact_stellar_payload_missing_signed_tx")]
    MissingSignedTx,

    /// The signed transaction is not valid XDR.
    #[serde(rename = "invalid_exact_stellar_payload_invalid_xdr")]
    InvalidXdr,

    /// The paying account does not exist on the ledger.
    #[serde(rename = "invalid_exact_stellar_payload_source_account_not_found")]
    SourceAccountNotFound,

    /// The paying account's balance does not cover amount plus fee.
    #[serde(rename = "invalid_exact_stellar_payload_insufficient_balance")]
    InsufficientBalance,

    /// The transaction pays less than the requirements demand.
    #[serde(rename = "invalid_exact_stellar_payload_amount_mismatch")]
    AmountMismatch,

    /// The transaction pays someone other than the required receiver.
    #[serde(rename = "invalid_exact_stellar_payload_destination_mismatch")]
    DestinationMismatch,

    /// The transaction moves a different asset than required.
    #[serde(rename = "invalid_exact_stellar_payload_asset_mismatch")]
    AssetMismatch,

    /// The transaction envelope targets a different network.
    #[serde(rename = "invalid_exact_stellar_payload_network_mismatch")]
    NetworkMismatch,

    /// One or more required payload fields are absent.
    #[serde(rename = "invalid_exact_stellar_payload_missing_required_fields")]
    MissingRequiredFields,

    /// The transaction's validity window has closed.
    #[serde(rename = "invalid_exact_stellar_payload_transaction_expired")]
    TransactionExpired,

    /// The transaction hash was already settled.
    #[serde(rename = "invalid_exact_stellar_payload_transaction_already_used")]
    TransactionAlreadyUsed,

    /// The ledger rejected or failed the transaction at settlement.
    #[serde(rename = "invalid_exact_stellar_settlement_transaction_failed")]
    TransactionFailed,

    /// Wrapping the transaction in a fee-bump envelope failed.
    #[serde(rename = "invalid_exact_stellar_settlement_fee_bump_failed")]
    FeeBumpFailed,
}

impl ErrorReason {
    /// The wire string for this reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InsufficientFunds => "insufficient_funds",
            Self::InvalidNetwork => "invalid_network",
            Self::InvalidPayload => "invalid_payload",
            Self::InvalidPaymentRequirements => "invalid_payment_requirements",
            Self::InvalidScheme => "invalid_scheme",
            Self::InvalidPayment => "invalid_payment",
            Self::PaymentExpired => "payment_expired",
            Self::UnsupportedScheme => "unsupported_scheme",
            Self::InvalidX402Version => "invalid_x402_version",
            Self::InvalidTransactionState => "invalid_transaction_state",
            Self::UnexpectedVerifyError => "unexpected_verify_error",
            Self::UnexpectedSettleError => "unexpected_settle_error",
            Self::MissingSignedTx => "invalid_exact_stellar_payload_missing_signed_tx",
            Self::InvalidXdr => "invalid_exact_stellar_payload_invalid_xdr",
            Self::SourceAccountNotFound => {
                "invalid_exact_stellar_payload_source_account_not_found"
            }
            Self::InsufficientBalance => "invalid_exact_stellar_payload_insufficient_balance",
            Self::AmountMismatch => "invalid_exact_stellar_payload_amount_mismatch",
            Self::DestinationMismatch => "invalid_exact_stellar_payload_destination_mismatch",
            Self::AssetMismatch => "invalid_exact_stellar_payload_asset_mismatch",
            Self::NetworkMismatch => "invalid_exact_stellar_payload_network_mismatch",
            Self::MissingRequiredFields => {
                "invalid_exact_stellar_payload_missing_required_fields"
            }
            Self::TransactionExpired => "invalid_exact_stellar_payload_transaction_expired",
            Self::TransactionAlreadyUsed => {
                "invalid_exact_stellar_payload_transaction_already_used"
            }
            Self::TransactionFailed => "invalid_exact_stellar_settlement_transaction_failed",
            Self::FeeBumpFailed => "invalid_exact_stellar_settlement_fee_bump_failed",
        }
    }
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_matches_as_str() {
        let all = [
            ErrorReason::InsufficientFunds,
            ErrorReason::InvalidNetwork,
            ErrorReason::InvalidPayload,
            ErrorReason::InvalidPaymentRequirements,
            ErrorReason::InvalidScheme,
            ErrorReason::InvalidPayment,
            ErrorReason::PaymentExpired,
            ErrorReason::UnsupportedScheme,
            ErrorReason::InvalidX402Version,
            ErrorReason::InvalidTransactionState,
            ErrorReason::UnexpectedVerifyError,
            ErrorReason::UnexpectedSettleError,
            ErrorReason::MissingSignedTx,
            ErrorReason::InvalidXdr,
            ErrorReason::SourceAccountNotFound,
            ErrorReason::InsufficientBalance,
            ErrorReason::AmountMismatch,
            ErrorReason::DestinationMismatch,
            ErrorReason::AssetMismatch,
            ErrorReason::NetworkMismatch,
            ErrorReason::MissingRequiredFields,
            ErrorReason::TransactionExpired,
            ErrorReason::TransactionAlreadyUsed,
            ErrorReason::TransactionFailed,
            ErrorReason::FeeBumpFailed,
        ];
        for reason in all {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.as_str()));
            let back: ErrorReason = serde_json::from_str(&json).unwrap();
            assert_eq!(back, reason);
        }
    }

    #[test]
    fn rejects_strings_outside_taxonomy() {
        assert!(serde_json::from_str::<ErrorReason>("\"card_declined\"").is_err());
    }
}
