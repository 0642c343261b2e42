//! Facilitator-side verification and settlement for the Stellar `exact`
//! scheme.
//!
//! [`ExactStellarFacilitator`] checks submitted payment payloads against
//! payment requirements and, at settlement time, submits them to the ledger
//! with replay protection keyed by the inner transaction hash. Native-asset
//! payments can be wrapped in a fee-bump envelope so the facilitator
//! sponsors submission fees; contract payments are submitted exactly as the
//! caller signed them.

mod settle;
mod verify;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Mutex;

use s402::error::PaymentError;
use s402::facilitator::Facilitator;
use s402::store::ReplayStore;
use s402_proto::{
    Network, SettleRequest, SettleResponse, SupportedKind, SupportedResponse, VerifyRequest,
    VerifyResponse, SCHEME_EXACT,
};

use crate::ledger::LedgerOps;
use crate::signer::{LocalKeySigner, TransactionSigner};

/// Configuration for the exact-scheme facilitator.
#[derive(Debug, Clone)]
pub struct ExactStellarConfig {
    /// The single network this engine serves.
    pub network: Network,

    /// Cadence of settlement confirmation polling.
    pub poll_interval: Duration,
}

impl ExactStellarConfig {
    /// Default configuration for a network: 1 s confirmation polling.
    #[must_use]
    pub const fn new(network: Network) -> Self {
        Self {
            network,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Verify/settle engine for `(exact, stellar*)` payments.
pub struct ExactStellarFacilitator<L> {
    ledger: L,
    config: ExactStellarConfig,
    replay: Arc<dyn ReplayStore>,
    fee_sponsor: Option<LocalKeySigner>,
    /// Per-hash settlement locks; concurrent settles of one payload
    /// serialize here so exactly one submission reaches the ledger.
    settle_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<L> std::fmt::Debug for ExactStellarFacilitator<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExactStellarFacilitator")
            .field("network", &self.config.network)
            .field("fee_sponsor", &self.fee_sponsor)
            .finish_non_exhaustive()
    }
}

impl<L> ExactStellarFacilitator<L> {
    /// Creates an engine over a ledger adapter and a shared replay store.
    pub fn new(ledger: L, config: ExactStellarConfig, replay: Arc<dyn ReplayStore>) -> Self {
        Self {
            ledger,
            config,
            replay,
            fee_sponsor: None,
            settle_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Configures a signing key for fee sponsorship of native payments.
    #[must_use]
    pub fn with_fee_sponsor(mut self, sponsor: LocalKeySigner) -> Self {
        self.fee_sponsor = Some(sponsor);
        self
    }

    /// The network this engine serves.
    #[must_use]
    pub const fn network(&self) -> Network {
        self.config.network
    }

    /// Acquires the settlement lock for a transaction hash.
    async fn lock_for(&self, tx_hash: &str) -> Arc<Mutex<()>> {
        let mut locks = self.settle_locks.lock().await;
        Arc::clone(
            locks
                .entry(tx_hash.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

#[async_trait::async_trait]
impl<L> Facilitator for ExactStellarFacilitator<L>
where
    L: LedgerOps,
{
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, PaymentError> {
        match self
            .verify_payment(&request.payment_payload, &request.payment_requirements)
            .await
        {
            Ok(verification) => {
                match self.ensure_unused(&verification).await {
                    Ok(()) => Ok(VerifyResponse::valid(verification.payer)),
                    Err(failure) => Ok(failure.into()),
                }
            }
            Err(failure) => Ok(failure.into()),
        }
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, PaymentError> {
        Ok(self
            .settle_payment(&request.payment_payload, &request.payment_requirements)
            .await)
    }

    async fn supported(&self) -> Result<SupportedResponse, PaymentError> {
        let extra = match &self.fee_sponsor {
            Some(sponsor) => json!({
                "feeSponsorship": true,
                "feePayer": sponsor.public_key(),
            }),
            None => json!({ "feeSponsorship": false }),
        };
        Ok(SupportedResponse {
            kinds: vec![SupportedKind {
                scheme: SCHEME_EXACT.to_owned(),
                network: self.config.network,
                extra: Some(extra),
            }],
        })
    }
}
