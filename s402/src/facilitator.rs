//! The facilitator capability.
//!
//! A facilitator verifies submitted payment payloads against payment
//! requirements and settles them on the ledger. Both the local scheme
//! engine and the remote HTTP client implement this trait, so the gate
//! middleware is agnostic about where verification actually runs.

use s402_proto::{SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse};

use crate::error::PaymentError;

/// Verify, settle, and capability discovery over payment payloads.
///
/// `verify` is a pure check with no ledger mutation and is safe to call
/// repeatedly. `settle` submits to the ledger and is idempotent on the
/// transaction hash. Both return protocol-level outcomes (`isValid=false`,
/// `success=false`) as `Ok` values; `Err` is reserved for transport
/// failures.
#[async_trait::async_trait]
pub trait Facilitator: Send + Sync {
    /// Verifies a payment payload against its requirements.
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, PaymentError>;

    /// Settles a payment on the ledger.
    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, PaymentError>;

    /// Returns the `(scheme, network)` pairs this facilitator handles.
    async fn supported(&self) -> Result<SupportedResponse, PaymentError>;
}

#[async_trait::async_trait]
impl<T> Facilitator for std::sync::Arc<T>
where
    T: Facilitator + ?Sized,
{
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, PaymentError> {
        (**self).verify(request).await
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, PaymentError> {
        (**self).settle(request).await
    }

    async fn supported(&self) -> Result<SupportedResponse, PaymentError> {
        (**self).supported().await
    }
}
