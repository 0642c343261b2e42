//! The verification half of the exact-scheme engine.
//!
//! Verification is a pure check: no ledger mutation, safe to repeat. Every
//! failure maps to one reason from the closed taxonomy; ledger and store
//! transport failures are logged and reported as `unexpected_verify_error`.

use s402::error::VerifyError;
use s402_proto::{
    parse_amount, ErrorReason, PaymentPayload, PaymentRequirements, ProtocolError,
    SCHEME_EXACT, X402_VERSION,
};
use stellar_xdr::curr::TransactionV1Envelope;

use crate::ledger::{LedgerError, LedgerOps};
use crate::tx::{self, PaymentAsset, PaymentDetails, TxError};

use super::ExactStellarFacilitator;

/// A payload that passed verification, with everything settlement needs.
#[derive(Debug, Clone)]
pub(crate) struct Verification {
    /// The paying account id.
    pub payer: String,
    /// Hex hash of the inner transaction; the replay-store key.
    pub tx_hash: String,
    /// The caller's signed envelope, untouched.
    pub inner: TransactionV1Envelope,
    /// The extracted payment.
    pub details: PaymentDetails,
}

impl<L> ExactStellarFacilitator<L>
where
    L: LedgerOps,
{
    /// Runs the full verification pipeline except the replay check, which
    /// [`Self::ensure_unused`] performs separately so that settlement can
    /// consult its result cache instead.
    pub(crate) async fn verify_payment(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<Verification, VerifyError> {
        // Version, scheme, and network gating.
        if payload.x402_version != X402_VERSION {
            return Err(ErrorReason::InvalidX402Version.into());
        }
        if payload.scheme != SCHEME_EXACT || requirements.scheme != SCHEME_EXACT {
            return Err(ErrorReason::UnsupportedScheme.into());
        }
        if requirements.network != self.config.network {
            return Err(ErrorReason::InvalidNetwork.into());
        }
        if payload.network != requirements.network {
            return Err(ErrorReason::NetworkMismatch.into());
        }

        requirements.validate().map_err(|e| match e {
            ProtocolError::UnsupportedScheme(_) => ErrorReason::UnsupportedScheme,
            _ => ErrorReason::InvalidPaymentRequirements,
        })?;

        let inner_payload = &payload.payload;
        inner_payload.require_fields().map_err(|e| match e {
            ProtocolError::MissingField("signedTxXdr") => ErrorReason::MissingSignedTx,
            _ => ErrorReason::MissingRequiredFields,
        })?;
        parse_amount(&inner_payload.amount).map_err(|_| ErrorReason::InvalidPayload)?;

        // Decode the signed transaction and pull out the single payment.
        let envelope = tx::parse_envelope(&inner_payload.signed_tx_xdr)
            .map_err(|_| ErrorReason::InvalidXdr)?;
        let (inner, details) =
            tx::extract_payment(&envelope, self.config.network).map_err(|e| match e {
                TxError::UnsupportedEnvelope => ErrorReason::InvalidTransactionState,
                _ => ErrorReason::InvalidPayload,
            })?;
        let inner = inner.clone();
        let payer = details.source.clone();

        if inner_payload.source_account != payer {
            return Err(VerifyError::new(ErrorReason::InvalidPayload).with_payer(payer));
        }

        // Cross-check the transaction against the requirements.
        let required = parse_amount(&requirements.max_amount_required)
            .map_err(|_| ErrorReason::InvalidPaymentRequirements)?;
        if details.destination != requirements.pay_to {
            return Err(
                VerifyError::new(ErrorReason::DestinationMismatch).with_payer(payer)
            );
        }
        if details.amount < required {
            return Err(VerifyError::new(ErrorReason::AmountMismatch).with_payer(payer));
        }
        let asset_matches = match &details.asset {
            PaymentAsset::Native => requirements.is_native(),
            PaymentAsset::Contract(contract) => contract == &requirements.asset,
        };
        if !asset_matches {
            return Err(VerifyError::new(ErrorReason::AssetMismatch).with_payer(payer));
        }

        // Source-account state: existence, balance, trust line.
        let account = self
            .ledger
            .account(&payer)
            .await
            .map_err(|e| self.transport_failure("account lookup", &e))?
            .ok_or_else(|| {
                VerifyError::new(ErrorReason::SourceAccountNotFound).with_payer(payer.clone())
            })?;

        let fee = i128::from(inner.tx.fee);
        match &details.asset {
            PaymentAsset::Native => {
                if account.native_balance < details.amount + fee {
                    return Err(
                        VerifyError::new(ErrorReason::InsufficientBalance).with_payer(payer)
                    );
                }
            }
            PaymentAsset::Contract(contract) => {
                if account.native_balance < fee {
                    return Err(
                        VerifyError::new(ErrorReason::InsufficientBalance).with_payer(payer)
                    );
                }
                match account.trust_line_balance(contract) {
                    None => {
                        return Err(
                            VerifyError::new(ErrorReason::InsufficientFunds).with_payer(payer)
                        )
                    }
                    Some(balance) if balance < details.amount => {
                        return Err(
                            VerifyError::new(ErrorReason::InsufficientBalance).with_payer(payer)
                        )
                    }
                    Some(_) => {}
                }
            }
        }

        // Expiration: ledger window and wall-clock time bounds.
        let current_ledger = self
            .ledger
            .latest_ledger()
            .await
            .map_err(|e| self.transport_failure("latest ledger", &e))?;
        if current_ledger > inner_payload.valid_until_ledger {
            return Err(VerifyError::new(ErrorReason::TransactionExpired).with_payer(payer));
        }
        #[allow(clippy::cast_sign_loss)]
        let now = chrono::Utc::now().timestamp() as u64;
        if tx::time_bounds_elapsed(&inner.tx, now) {
            return Err(VerifyError::new(ErrorReason::TransactionExpired).with_payer(payer));
        }

        let hash = tx::transaction_hash(&inner.tx, self.config.network)
            .map_err(|_| VerifyError::new(ErrorReason::InvalidXdr).with_payer(payer.clone()))?;

        Ok(Verification {
            payer,
            tx_hash: hex::encode(hash),
            inner,
            details,
        })
    }

    /// The replay check: fails when the transaction hash is already in the
    /// replay store.
    pub(crate) async fn ensure_unused(
        &self,
        verification: &Verification,
    ) -> Result<(), VerifyError> {
        let seen = self
            .replay
            .get(&verification.tx_hash)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "replay store read failed");
                VerifyError::new(ErrorReason::UnexpectedVerifyError)
                    .with_payer(verification.payer.clone())
            })?;
        if seen.is_some() {
            return Err(VerifyError::new(ErrorReason::TransactionAlreadyUsed)
                .with_payer(verification.payer.clone()));
        }
        Ok(())
    }

    fn transport_failure(&self, what: &str, error: &LedgerError) -> VerifyError {
        tracing::error!(network = %self.config.network, error = %error, "{what} failed");
        VerifyError::new(ErrorReason::UnexpectedVerifyError)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::testing::{
        contract_payload, native_payload, payer, requirements, ScriptedLedger, CONTRACT, OTHER,
    };
    use super::super::{ExactStellarConfig, ExactStellarFacilitator};
    use crate::signer::TransactionSigner;
    use s402::facilitator::Facilitator;
    use s402::store::{MemoryStore, ReplayStore};
    use s402_proto::{
        ErrorReason, Network, SettleResponse, VerifyRequest, NATIVE_ASSET, X402_VERSION,
    };

    fn engine(ledger: ScriptedLedger) -> ExactStellarFacilitator<ScriptedLedger> {
        ExactStellarFacilitator::new(
            ledger,
            ExactStellarConfig::new(Network::StellarTestnet),
            Arc::new(MemoryStore::new()),
        )
    }

    fn verify_request(
        payload: s402_proto::PaymentPayload,
        reqs: s402_proto::PaymentRequirements,
    ) -> VerifyRequest {
        VerifyRequest {
            x402_version: X402_VERSION,
            payment_payload: payload,
            payment_requirements: reqs,
        }
    }

    #[tokio::test]
    async fn accepts_exact_native_payment() {
        let fac = engine(ScriptedLedger::funded(1_000));
        let request = verify_request(
            native_payload(10_000_000, 2_000),
            requirements(NATIVE_ASSET, "10000000"),
        );

        let response = fac.verify(&request).await.unwrap();
        assert!(response.is_valid, "reason: {:?}", response.invalid_reason);
        assert_eq!(response.payer.unwrap(), payer().public_key());
    }

    #[tokio::test]
    async fn accepts_overpayment() {
        let fac = engine(ScriptedLedger::funded(1_000));
        let request = verify_request(
            native_payload(10_000_001, 2_000),
            requirements(NATIVE_ASSET, "10000000"),
        );
        assert!(fac.verify(&request).await.unwrap().is_valid);
    }

    #[tokio::test]
    async fn rejects_underpayment() {
        let fac = engine(ScriptedLedger::funded(1_000));
        let request = verify_request(
            native_payload(9_999_999, 2_000),
            requirements(NATIVE_ASSET, "10000000"),
        );

        let response = fac.verify(&request).await.unwrap();
        assert!(!response.is_valid);
        assert_eq!(response.invalid_reason, Some(ErrorReason::AmountMismatch));
        assert!(response.payer.is_some());
    }

    #[tokio::test]
    async fn rejects_wrong_destination() {
        let fac = engine(ScriptedLedger::funded(1_000));
        let mut reqs = requirements(NATIVE_ASSET, "10000000");
        reqs.pay_to = OTHER.to_owned();
        let request = verify_request(native_payload(10_000_000, 2_000), reqs);

        let response = fac.verify(&request).await.unwrap();
        assert_eq!(
            response.invalid_reason,
            Some(ErrorReason::DestinationMismatch)
        );
    }

    #[tokio::test]
    async fn rejects_asset_mismatch() {
        let fac = engine(ScriptedLedger::funded(1_000));
        let request = verify_request(
            native_payload(10_000_000, 2_000),
            requirements(CONTRACT, "10000000"),
        );
        assert_eq!(
            fac.verify(&request).await.unwrap().invalid_reason,
            Some(ErrorReason::AssetMismatch)
        );
    }

    #[tokio::test]
    async fn rejects_expired_ledger_window() {
        // validUntilLedger is one behind the current ledger.
        let fac = engine(ScriptedLedger::funded(2_001));
        let request = verify_request(
            native_payload(10_000_000, 2_000),
            requirements(NATIVE_ASSET, "10000000"),
        );
        assert_eq!(
            fac.verify(&request).await.unwrap().invalid_reason,
            Some(ErrorReason::TransactionExpired)
        );
    }

    #[tokio::test]
    async fn rejects_unknown_source_account() {
        let ledger = ScriptedLedger::funded(1_000);
        *ledger.account.lock().unwrap() = None;
        let fac = engine(ledger);
        let request = verify_request(
            native_payload(10_000_000, 2_000),
            requirements(NATIVE_ASSET, "10000000"),
        );
        assert_eq!(
            fac.verify(&request).await.unwrap().invalid_reason,
            Some(ErrorReason::SourceAccountNotFound)
        );
    }

    #[tokio::test]
    async fn rejects_balance_below_amount_plus_fee() {
        let ledger = ScriptedLedger::funded(1_000);
        ledger
            .account
            .lock()
            .unwrap()
            .as_mut()
            .unwrap()
            .native_balance = 10_000_050; // covers the amount but not the fee
        let fac = engine(ledger);
        let request = verify_request(
            native_payload(10_000_000, 2_000),
            requirements(NATIVE_ASSET, "10000000"),
        );
        assert_eq!(
            fac.verify(&request).await.unwrap().invalid_reason,
            Some(ErrorReason::InsufficientBalance)
        );
    }

    #[tokio::test]
    async fn rejects_missing_trust_line() {
        let ledger = ScriptedLedger::funded(1_000);
        ledger
            .account
            .lock()
            .unwrap()
            .as_mut()
            .unwrap()
            .trust_lines
            .clear();
        let fac = engine(ledger);
        let request = verify_request(
            contract_payload(500_000, 2_000),
            requirements(CONTRACT, "500000"),
        );
        assert_eq!(
            fac.verify(&request).await.unwrap().invalid_reason,
            Some(ErrorReason::InsufficientFunds)
        );
    }

    #[tokio::test]
    async fn accepts_contract_transfer_with_trust_line() {
        let fac = engine(ScriptedLedger::funded(1_000));
        let request = verify_request(
            contract_payload(500_000, 2_000),
            requirements(CONTRACT, "500000"),
        );
        let response = fac.verify(&request).await.unwrap();
        assert!(response.is_valid, "reason: {:?}", response.invalid_reason);
    }

    #[tokio::test]
    async fn rejects_garbage_xdr() {
        let fac = engine(ScriptedLedger::funded(1_000));
        let mut payload = native_payload(10_000_000, 2_000);
        payload.payload.signed_tx_xdr = "not-xdr!".to_owned();
        let request = verify_request(payload, requirements(NATIVE_ASSET, "10000000"));
        assert_eq!(
            fac.verify(&request).await.unwrap().invalid_reason,
            Some(ErrorReason::InvalidXdr)
        );
    }

    #[tokio::test]
    async fn rejects_missing_signed_tx() {
        let fac = engine(ScriptedLedger::funded(1_000));
        let mut payload = native_payload(10_000_000, 2_000);
        payload.payload.signed_tx_xdr = String::new();
        let request = verify_request(payload, requirements(NATIVE_ASSET, "10000000"));
        assert_eq!(
            fac.verify(&request).await.unwrap().invalid_reason,
            Some(ErrorReason::MissingSignedTx)
        );
    }

    #[tokio::test]
    async fn rejects_wrong_version_and_network() {
        let fac = engine(ScriptedLedger::funded(1_000));

        let mut payload = native_payload(10_000_000, 2_000);
        payload.x402_version = 3;
        let request = verify_request(payload, requirements(NATIVE_ASSET, "10000000"));
        assert_eq!(
            fac.verify(&request).await.unwrap().invalid_reason,
            Some(ErrorReason::InvalidX402Version)
        );

        let mut reqs = requirements(NATIVE_ASSET, "10000000");
        reqs.network = Network::Stellar;
        let request = verify_request(native_payload(10_000_000, 2_000), reqs);
        assert_eq!(
            fac.verify(&request).await.unwrap().invalid_reason,
            Some(ErrorReason::InvalidNetwork)
        );
    }

    #[tokio::test]
    async fn rejects_already_settled_hash() {
        let fac = engine(ScriptedLedger::funded(1_000));
        let payload = native_payload(10_000_000, 2_000);
        let request = verify_request(payload, requirements(NATIVE_ASSET, "10000000"));

        // Seed the replay store with this payload's inner hash.
        let verification = fac
            .verify_payment(&request.payment_payload, &request.payment_requirements)
            .await
            .unwrap();
        fac.replay
            .put_if_absent(
                &verification.tx_hash,
                &SettleResponse::success(
                    verification.tx_hash.clone(),
                    Network::StellarTestnet,
                    verification.payer.clone(),
                ),
            )
            .await
            .unwrap();

        let response = fac.verify(&request).await.unwrap();
        assert_eq!(
            response.invalid_reason,
            Some(ErrorReason::TransactionAlreadyUsed)
        );
    }
}
