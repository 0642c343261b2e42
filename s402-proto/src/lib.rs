//! Wire format types for the s402 payment protocol.
//!
//! This crate defines the serialization-level data structures exchanged
//! between resource servers, clients, and facilitators: payment
//! requirements, payment payloads, facilitator responses, and the discovery
//! catalog. It has minimal dependencies and is the shared "lingua franca"
//! across the entire s402 stack.
//!
//! # Modules
//!
//! - [`requirements`] — Payment requirements and the 402 response body
//! - [`payload`] — Payment payloads and the `X-Payment` header codec
//! - [`responses`] — Facilitator responses (`VerifyResponse`, `SettleResponse`, etc.)
//! - [`reason`] — The closed error-reason taxonomy
//! - [`network`] — Stellar network tags and endpoint metadata
//! - [`amount`] — Decimal-string amount parsing and scaling
//! - [`discovery`] — Discovery catalog entries
//! - [`encoding`] — Base64 wrapping for header values

pub mod amount;
pub mod discovery;
pub mod encoding;
pub mod network;
pub mod payload;
pub mod reason;
pub mod requirements;
pub mod responses;

pub use amount::parse_amount;
pub use discovery::{DiscoveryEntry, DiscoveryListResponse, RegisterRequest, UnregisterRequest};
pub use encoding::Base64Bytes;
pub use network::Network;
pub use payload::{ExactStellarPayload, PaymentPayload, SettleRequest, VerifyRequest};
pub use reason::ErrorReason;
pub use requirements::{PaymentRequired, PaymentRequirements};
pub use responses::{
    SettleResponse, SettlementHeader, SupportedKind, SupportedResponse, VerifyResponse,
};

/// Current protocol version.
pub const X402_VERSION: u32 = 1;

/// The only payment scheme this stack implements.
pub const SCHEME_EXACT: &str = "exact";

/// Sentinel asset identifier for the ledger's native asset.
pub const NATIVE_ASSET: &str = "native";

/// Name of the request header carrying the encoded payment payload.
pub const PAYMENT_HEADER: &str = "X-Payment";

/// Name of the response header carrying the encoded settlement result.
pub const PAYMENT_RESPONSE_HEADER: &str = "X-Payment-Response";

/// Errors that can occur when parsing or validating s402 protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The `x402Version` field has an unsupported value.
    #[error("invalid x402Version: {0}")]
    InvalidVersion(u32),

    /// The payment scheme is not supported.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// The network tag is not one of the supported networks.
    #[error("unknown network: {0}")]
    UnknownNetwork(String),

    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// An amount string is not a valid non-negative integer.
    #[error("invalid amount {value:?}: {reason}")]
    InvalidAmount {
        /// The offending amount string.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A structural requirement on the payment requirements was violated.
    #[error("invalid payment requirements: {0}")]
    InvalidRequirements(&'static str),

    /// Base64 decoding failed.
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
