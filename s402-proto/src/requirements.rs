//! Payment requirements and the 402 response body.
//!
//! Payment requirements (the "challenge") describe what must be paid, to
//! whom, on which network, and in which asset before a protected resource
//! is served. They are derived per request and never stored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::amount::parse_amount;
use crate::network::Network;
use crate::{ProtocolError, NATIVE_ASSET, SCHEME_EXACT, X402_VERSION};

/// Payment requirements for a protected resource.
///
/// # JSON Format
///
/// ```json
/// {
///   "scheme": "exact",
///   "network": "stellar-testnet",
///   "maxAmountRequired": "10000000",
///   "resource": "https://api.example.com/weather",
///   "payTo": "G...",
///   "maxTimeoutSeconds": 300,
///   "asset": "native"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment scheme identifier. Only `"exact"` is defined.
    pub scheme: String,

    /// Target network tag.
    pub network: Network,

    /// Required amount in the asset's smallest unit, as a decimal string.
    pub max_amount_required: String,

    /// Absolute URL of the protected resource.
    pub resource: String,

    /// Optional human-readable description of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Optional MIME type of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Receiver account id (`G...`).
    pub pay_to: String,

    /// Maximum time in seconds for payment validity.
    pub max_timeout_seconds: u64,

    /// Asset identifier: the native sentinel or a contract id (`C...`).
    pub asset: String,

    /// Additional scheme-specific data (e.g. the facilitator's fee payer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl PaymentRequirements {
    /// Whether the requirement is for the ledger's native asset.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.asset == NATIVE_ASSET
    }

    /// Structural validation of the requirement.
    ///
    /// Checks scheme, amount, timeout, resource, and the asset identifier
    /// shape. Cryptographic validation of account ids is the ledger layer's
    /// job.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] describing the first violated constraint.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.scheme != SCHEME_EXACT {
            return Err(ProtocolError::UnsupportedScheme(self.scheme.clone()));
        }
        let amount = parse_amount(&self.max_amount_required)?;
        if amount < 1 {
            return Err(ProtocolError::InvalidRequirements(
                "maxAmountRequired must be at least 1",
            ));
        }
        if self.max_timeout_seconds == 0 {
            return Err(ProtocolError::InvalidRequirements(
                "maxTimeoutSeconds must be positive",
            ));
        }
        if self.resource.is_empty() {
            return Err(ProtocolError::MissingField("resource"));
        }
        if self.pay_to.is_empty() {
            return Err(ProtocolError::MissingField("payTo"));
        }
        if !self.is_native() && !looks_like_contract_id(&self.asset) {
            return Err(ProtocolError::InvalidRequirements(
                "asset must be \"native\" or a contract id",
            ));
        }
        Ok(())
    }
}

/// The 402 response body listing acceptable payments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version.
    #[serde(default = "default_version")]
    pub x402_version: u32,

    /// Human-readable error string, conventionally `"Payment Required"`.
    pub error: String,

    /// List of accepted payment requirements.
    pub accepts: Vec<PaymentRequirements>,
}

impl PaymentRequired {
    /// Builds the standard 402 body for a set of requirements.
    #[must_use]
    pub fn new(accepts: Vec<PaymentRequirements>) -> Self {
        Self {
            x402_version: X402_VERSION,
            error: "Payment Required".to_owned(),
            accepts,
        }
    }

    /// Builds a 402 body carrying a specific rejection reason.
    #[must_use]
    pub fn with_error(accepts: Vec<PaymentRequirements>, error: impl Into<String>) -> Self {
        Self {
            x402_version: X402_VERSION,
            error: error.into(),
            accepts,
        }
    }
}

/// Shape check for `C...` strkey contract ids: length, prefix, and the
/// RFC 4648 base32 alphabet. The checksum is verified by the ledger layer.
fn looks_like_contract_id(asset: &str) -> bool {
    asset.len() == 56
        && asset.starts_with('C')
        && asset
            .bytes()
            .all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b))
}

const fn default_version() -> u32 {
    X402_VERSION
}
