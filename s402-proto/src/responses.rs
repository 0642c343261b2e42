//! Facilitator response types.
//!
//! These types travel between resource servers and facilitators during
//! payment verification and settlement, and back to the paying client in
//! the `X-Payment-Response` header.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::encoding::Base64Bytes;
use crate::network::Network;
use crate::reason::ErrorReason;
use crate::ProtocolError;

/// Response from payment verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Whether the payment is valid.
    pub is_valid: bool,

    /// Reason for invalidity. Set exactly when `is_valid` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<ErrorReason>,

    /// The payer's account id, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl VerifyResponse {
    /// Creates a valid verification response.
    #[must_use]
    pub fn valid(payer: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            payer: Some(payer.into()),
        }
    }

    /// Creates an invalid verification response.
    #[must_use]
    pub const fn invalid(reason: ErrorReason) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason),
            payer: None,
        }
    }

    /// Creates an invalid response that still identifies the payer.
    #[must_use]
    pub fn invalid_with_payer(reason: ErrorReason, payer: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason),
            payer: Some(payer.into()),
        }
    }
}

/// Response from payment settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    /// Whether settlement was successful.
    pub success: bool,

    /// Reason for failure. Set exactly when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<ErrorReason>,

    /// The payer's account id, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,

    /// Hash of the accepted ledger transaction. Non-empty when `success`.
    pub transaction: String,

    /// Network where settlement occurred.
    pub network: Network,
}

impl SettleResponse {
    /// Creates a successful settlement response.
    #[must_use]
    pub fn success(
        transaction: impl Into<String>,
        network: Network,
        payer: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            error_reason: None,
            payer: Some(payer.into()),
            transaction: transaction.into(),
            network,
        }
    }

    /// Creates a failed settlement response.
    #[must_use]
    pub const fn error(reason: ErrorReason, network: Network) -> Self {
        Self {
            success: false,
            error_reason: Some(reason),
            payer: None,
            transaction: String::new(),
            network,
        }
    }

    /// Creates a failed settlement response that identifies the payer.
    #[must_use]
    pub fn error_with_payer(
        reason: ErrorReason,
        network: Network,
        payer: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error_reason: Some(reason),
            payer: Some(payer.into()),
            transaction: String::new(),
            network,
        }
    }

    /// Encodes the settlement outcome as an `X-Payment-Response` header
    /// value: base64 of `{success, transaction, network, payer}`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Json`] if serialization fails.
    pub fn to_header(&self) -> Result<String, ProtocolError> {
        let view = SettlementHeader {
            success: self.success,
            transaction: self.transaction.clone(),
            network: self.network,
            payer: self.payer.clone(),
        };
        let json = serde_json::to_vec(&view)?;
        Ok(Base64Bytes::encode(json).to_string())
    }
}

/// The `X-Payment-Response` header body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementHeader {
    /// Whether settlement succeeded.
    pub success: bool,

    /// Hash of the settled transaction.
    pub transaction: String,

    /// Network where settlement occurred.
    pub network: Network,

    /// The payer's account id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl SettlementHeader {
    /// Decodes a settlement header from raw header bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on base64 or JSON failure.
    pub fn from_header(header: &[u8]) -> Result<Self, ProtocolError> {
        let raw = Base64Bytes::from(header).decode()?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// A supported payment configuration: one `(scheme, network)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    /// Payment scheme identifier.
    pub scheme: String,

    /// Network tag.
    pub network: Network,

    /// Additional pair-specific data (e.g. fee sponsorship availability).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Describes what payment kinds a facilitator handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    /// List of supported payment kinds.
    pub kinds: Vec<SupportedKind>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_reason_set_iff_invalid() {
        let ok = VerifyResponse::valid("GABC");
        assert!(ok.is_valid && ok.invalid_reason.is_none());

        let bad = VerifyResponse::invalid(ErrorReason::AmountMismatch);
        assert!(!bad.is_valid);
        assert_eq!(bad.invalid_reason, Some(ErrorReason::AmountMismatch));
    }

    #[test]
    fn settlement_header_round_trip() {
        let settle = SettleResponse::success("ab12", Network::StellarTestnet, "GABC");
        let header = settle.to_header().unwrap();
        let decoded = SettlementHeader::from_header(header.as_bytes()).unwrap();
        assert!(decoded.success);
        assert_eq!(decoded.transaction, "ab12");
        assert_eq!(decoded.network, Network::StellarTestnet);
        assert_eq!(decoded.payer.as_deref(), Some("GABC"));
    }

    #[test]
    fn settle_error_has_empty_transaction() {
        let settle = SettleResponse::error(ErrorReason::TransactionFailed, Network::Stellar);
        assert!(!settle.success);
        assert!(settle.transaction.is_empty());
        let json = serde_json::to_value(&settle).unwrap();
        assert_eq!(
            json["errorReason"],
            "invalid_exact_stellar_settlement_transaction_failed"
        );
    }
}
