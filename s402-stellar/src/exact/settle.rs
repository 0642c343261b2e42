//! The settlement half of the exact-scheme engine.
//!
//! Settlement re-verifies, consults the replay store for a cached outcome,
//! submits to the ledger (fee-bumped for sponsored native payments), polls
//! for confirmation, and records the result before reporting success.

use std::time::{Duration, Instant};

use s402_proto::{ErrorReason, PaymentPayload, PaymentRequirements, SettleResponse};

use crate::ledger::{LedgerOps, TxStatus};
use crate::signer::TransactionSigner;
use crate::tx::{self, PaymentAsset};

use super::verify::Verification;
use super::ExactStellarFacilitator;

impl<L> ExactStellarFacilitator<L>
where
    L: LedgerOps,
{
    /// Settles a payment, idempotently on the inner transaction hash.
    pub(crate) async fn settle_payment(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> SettleResponse {
        let network = self.config.network;

        let verification = match self.verify_payment(payload, requirements).await {
            Ok(verification) => verification,
            Err(failure) => {
                return match failure.payer {
                    Some(payer) => {
                        SettleResponse::error_with_payer(failure.reason, network, payer)
                    }
                    None => SettleResponse::error(failure.reason, network),
                };
            }
        };

        // Serialize concurrent settlements of the same hash, then consult
        // the cache under the lock so at most one submission wins.
        let lock = self.lock_for(&verification.tx_hash).await;
        let _guard = lock.lock().await;

        match self.replay.get(&verification.tx_hash).await {
            Ok(Some(cached)) => {
                tracing::debug!(
                    tx_hash = %verification.tx_hash,
                    "returning cached settlement result"
                );
                return cached;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "replay store read failed");
                return SettleResponse::error_with_payer(
                    ErrorReason::UnexpectedSettleError,
                    network,
                    verification.payer,
                );
            }
        }

        // Polling is bounded by the requirements' timeout budget.
        let budget = Duration::from_secs(requirements.max_timeout_seconds.max(1));
        let outcome = match self.submit_verified(payload, &verification, budget).await {
            Ok(outcome) => outcome,
            Err(reason) => {
                return SettleResponse::error_with_payer(reason, network, verification.payer)
            }
        };

        // The accepted hash (outer hash when fee-bumped) goes to the caller;
        // the replay store stays keyed by the inner transaction hash.
        let response =
            SettleResponse::success(outcome, network, verification.payer.clone());
        match self
            .replay
            .put_if_absent(&verification.tx_hash, &response)
            .await
        {
            Ok(_) => response,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    tx_hash = %verification.tx_hash,
                    "settled on ledger but failed to record replay entry"
                );
                SettleResponse::error_with_payer(
                    ErrorReason::UnexpectedSettleError,
                    network,
                    verification.payer,
                )
            }
        }
    }

    /// Submits the verified payment and polls until confirmation.
    /// Returns the hex hash the ledger accepted.
    async fn submit_verified(
        &self,
        payload: &PaymentPayload,
        verification: &Verification,
        budget: Duration,
    ) -> Result<String, ErrorReason> {
        let envelope_xdr = match (&verification.details.asset, &self.fee_sponsor) {
            // Sponsored native payment: wrap in a fee-bump envelope. The
            // inner envelope is embedded unmodified.
            (PaymentAsset::Native, Some(sponsor)) => {
                let bump = tx::fee_bump_wrap(verification.inner.clone(), &sponsor.public_key())
                    .map_err(|e| {
                        tracing::error!(error = %e, "fee-bump assembly failed");
                        ErrorReason::FeeBumpFailed
                    })?;
                let hash = tx::fee_bump_hash(&bump, self.config.network).map_err(|e| {
                    tracing::error!(error = %e, "fee-bump hashing failed");
                    ErrorReason::FeeBumpFailed
                })?;
                let signature = sponsor.sign_hash(&hash);
                let envelope = tx::fee_bump_envelope(bump, signature).map_err(|e| {
                    tracing::error!(error = %e, "fee-bump envelope failed");
                    ErrorReason::FeeBumpFailed
                })?;
                tx::envelope_to_base64(&envelope).map_err(|e| {
                    tracing::error!(error = %e, "fee-bump encoding failed");
                    ErrorReason::FeeBumpFailed
                })?
            }
            // Everything else goes to the ledger exactly as signed.
            _ => payload.payload.signed_tx_xdr.clone(),
        };

        let outcome = self.ledger.submit(&envelope_xdr).await.map_err(|e| {
            tracing::error!(error = %e, "transaction submission failed");
            ErrorReason::UnexpectedSettleError
        })?;
        if !outcome.accepted {
            tracing::warn!(
                tx_hash = %outcome.hash,
                error = ?outcome.error,
                "ledger rejected transaction"
            );
            return Err(ErrorReason::TransactionFailed);
        }

        self.await_confirmation(&outcome.hash, verification, budget)
            .await?;
        Ok(outcome.hash)
    }

    /// Polls the transaction status until success, failure, or the
    /// requirements' timeout budget runs out.
    async fn await_confirmation(
        &self,
        hash: &str,
        verification: &Verification,
        budget: Duration,
    ) -> Result<(), ErrorReason> {
        let deadline = Instant::now() + budget;
        loop {
            match self.ledger.transaction_status(hash).await {
                Ok(TxStatus::Success) => {
                    tracing::info!(
                        tx_hash = %hash,
                        payer = %verification.payer,
                        "settlement confirmed"
                    );
                    return Ok(());
                }
                Ok(TxStatus::Failed(detail)) => {
                    tracing::warn!(tx_hash = %hash, detail = %detail, "settlement failed");
                    return Err(ErrorReason::TransactionFailed);
                }
                Ok(TxStatus::NotFound | TxStatus::Pending) => {}
                Err(e) => {
                    tracing::error!(error = %e, "confirmation poll failed");
                    return Err(ErrorReason::UnexpectedSettleError);
                }
            }
            if Instant::now() >= deadline {
                tracing::warn!(tx_hash = %hash, "confirmation timed out");
                return Err(ErrorReason::InvalidTransactionState);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
