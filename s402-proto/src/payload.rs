//! Payment payloads and the `X-Payment` header codec.
//!
//! A payload wraps a fully signed ledger transaction (base64 XDR) together
//! with the metadata a facilitator needs to verify it against payment
//! requirements. The whole structure travels base64-encoded in the
//! `X-Payment` request header.

use serde::{Deserialize, Serialize};

use crate::encoding::Base64Bytes;
use crate::network::Network;
use crate::requirements::PaymentRequirements;
use crate::{ProtocolError, X402_VERSION};

/// Scheme-specific inner payload for the Stellar `exact` scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExactStellarPayload {
    /// The signed transaction envelope, base64-encoded XDR.
    pub signed_tx_xdr: String,

    /// The paying account id (`G...`).
    pub source_account: String,

    /// Payment amount in the asset's smallest unit, as a decimal string.
    pub amount: String,

    /// Receiving account id.
    pub destination: String,

    /// Asset identifier: the native sentinel or a contract id.
    pub asset: String,

    /// Last ledger sequence at which the payment is considered valid.
    pub valid_until_ledger: u32,

    /// Client-generated random nonce. Informational; replay protection is
    /// enforced by transaction hash.
    pub nonce: String,
}

impl ExactStellarPayload {
    /// Checks that every required field is present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingField`] naming the first empty field.
    pub fn require_fields(&self) -> Result<(), ProtocolError> {
        if self.signed_tx_xdr.is_empty() {
            return Err(ProtocolError::MissingField("signedTxXdr"));
        }
        if self.source_account.is_empty() {
            return Err(ProtocolError::MissingField("sourceAccount"));
        }
        if self.amount.is_empty() {
            return Err(ProtocolError::MissingField("amount"));
        }
        if self.destination.is_empty() {
            return Err(ProtocolError::MissingField("destination"));
        }
        if self.asset.is_empty() {
            return Err(ProtocolError::MissingField("asset"));
        }
        Ok(())
    }
}

/// A complete payment payload as carried in the `X-Payment` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaymentPayload {
    /// Protocol version (always 1).
    pub x402_version: u32,

    /// Payment scheme identifier.
    pub scheme: String,

    /// Network the inner transaction targets.
    pub network: Network,

    /// Scheme-specific payload data.
    pub payload: ExactStellarPayload,
}

impl PaymentPayload {
    /// Encodes the payload as an `X-Payment` header value.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Json`] if serialization fails.
    pub fn to_header(&self) -> Result<String, ProtocolError> {
        let json = serde_json::to_vec(self)?;
        Ok(Base64Bytes::encode(json).to_string())
    }

    /// Decodes a payload from raw `X-Payment` header bytes.
    ///
    /// The decode is strict: unknown fields, malformed base64, and
    /// malformed JSON are all rejected, so any corruption of the header is
    /// detected here.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on base64 or JSON failure.
    pub fn from_header(header: &[u8]) -> Result<Self, ProtocolError> {
        let raw = Base64Bytes::from(header).decode()?;
        let payload: Self = serde_json::from_slice(&raw)?;
        if payload.x402_version != X402_VERSION {
            return Err(ProtocolError::InvalidVersion(payload.x402_version));
        }
        Ok(payload)
    }
}

/// Request body for `POST /verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Protocol version.
    pub x402_version: u32,

    /// The payment payload to verify.
    pub payment_payload: PaymentPayload,

    /// The requirements to verify against.
    pub payment_requirements: PaymentRequirements,
}

/// Request body for `POST /settle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    /// Protocol version.
    pub x402_version: u32,

    /// The payment payload to settle.
    pub payment_payload: PaymentPayload,

    /// The requirements for settlement.
    pub payment_requirements: PaymentRequirements,
}

impl From<VerifyRequest> for SettleRequest {
    fn from(value: VerifyRequest) -> Self {
        Self {
            x402_version: value.x402_version,
            payment_payload: value.payment_payload,
            payment_requirements: value.payment_requirements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NATIVE_ASSET, SCHEME_EXACT};

    fn payload() -> PaymentPayload {
        PaymentPayload {
            x402_version: X402_VERSION,
            scheme: SCHEME_EXACT.to_owned(),
            network: Network::StellarTestnet,
            payload: ExactStellarPayload {
                signed_tx_xdr: "AAAAAgAAAAB1dW1teQ==".to_owned(),
                source_account: "GDQNY3PBOJOKYZSRMK2S7LHHGWZIUISD4QORETLMXEWXBI7KFZZMKTL3"
                    .to_owned(),
                amount: "10000000".to_owned(),
                destination: "GB3KJPLFUYN5VL6R3GU3EGCGVCKFDSD7BEDX42HWG5BWFKB3KQGJJRMA"
                    .to_owned(),
                asset: NATIVE_ASSET.to_owned(),
                valid_until_ledger: 123_456,
                nonce: "d3f1a2b4-5c6d-4e7f-8a9b-0c1d2e3f4a5b".to_owned(),
            },
        }
    }

    #[test]
    fn header_round_trip() {
        let original = payload();
        let header = original.to_header().unwrap();
        let decoded = PaymentPayload::from_header(header.as_bytes()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn header_bit_flip_is_detected() {
        let header = payload().to_header().unwrap();
        let mut bytes = header.into_bytes();
        // Flip the high bit of the first byte, pushing it outside the
        // base64 alphabet.
        bytes[0] ^= 0x80;
        assert!(PaymentPayload::from_header(&bytes).is_err());
    }

    #[test]
    fn rejects_unknown_fields() {
        let mut value = serde_json::to_value(payload()).unwrap();
        value["surprise"] = serde_json::json!(true);
        let raw = serde_json::to_vec(&value).unwrap();
        let header = Base64Bytes::encode(raw);
        assert!(PaymentPayload::from_header(header.as_ref()).is_err());
    }

    #[test]
    fn rejects_wrong_version() {
        let mut wrong = payload();
        wrong.x402_version = 2;
        let header = wrong.to_header().unwrap();
        assert!(matches!(
            PaymentPayload::from_header(header.as_bytes()),
            Err(ProtocolError::InvalidVersion(2))
        ));
    }

    #[test]
    fn require_fields_names_first_missing() {
        let mut p = payload().payload;
        p.signed_tx_xdr = String::new();
        assert!(matches!(
            p.require_fields(),
            Err(ProtocolError::MissingField("signedTxXdr"))
        ));
    }
}
