//! Client-side payment building.
//!
//! [`PaymentBuilder`] turns payment requirements into a signed, encoded
//! `X-Payment` header value: it loads the payer's sequence, builds the
//! payment or contract-transfer transaction, simulates contract calls to
//! obtain authorization entries and resources, signs through the
//! [`TransactionSigner`] capability, and assembles the final payload.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use uuid::Uuid;

use s402_proto::network::LEDGER_CLOSE_SECONDS;
use s402_proto::{
    parse_amount, ExactStellarPayload, PaymentPayload, PaymentRequirements, ProtocolError,
    SCHEME_EXACT, X402_VERSION,
};
use stellar_xdr::curr::{Limits, ReadXdr, SorobanAuthorizationEntry};

use crate::ledger::{LedgerError, LedgerOps};
use crate::signer::{SignerError, TransactionSigner};
use crate::tx::{self, TxError};

/// Fallback transaction timeout when the requirements carry none.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Errors from payment building.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The requirements or the assembled payload failed protocol rules.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The payer's account does not exist on the ledger.
    #[error("payer account {0} not found")]
    AccountNotFound(String),

    /// A ledger endpoint failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Signing failed or was cancelled.
    #[error(transparent)]
    Signer(#[from] SignerError),

    /// Transaction assembly failed.
    #[error(transparent)]
    Tx(#[from] TxError),

    /// Contract-call simulation was rejected by the RPC endpoint.
    #[error("simulation failed: {0}")]
    Simulation(String),
}

/// Builds signed payment payloads for a payer identity.
#[derive(Debug)]
pub struct PaymentBuilder<L, S> {
    ledger: L,
    signer: S,
}

impl<L, S> PaymentBuilder<L, S>
where
    L: LedgerOps,
    S: TransactionSigner,
{
    /// Creates a builder over a ledger adapter and a signer.
    pub const fn new(ledger: L, signer: S) -> Self {
        Self { ledger, signer }
    }

    /// Builds the `X-Payment` header value for the given requirements.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the requirements are malformed, the payer
    /// account is missing, any ledger call fails, or signing is declined.
    pub async fn build_header(
        &self,
        requirements: &PaymentRequirements,
    ) -> Result<String, ClientError> {
        let payload = self.build_payment(requirements).await?;
        Ok(payload.to_header()?)
    }

    /// Builds a complete signed payment payload for the given requirements.
    ///
    /// # Errors
    ///
    /// See [`Self::build_header`].
    pub async fn build_payment(
        &self,
        requirements: &PaymentRequirements,
    ) -> Result<PaymentPayload, ClientError> {
        requirements.validate()?;

        let source = self.signer.public_key();
        let account = self
            .ledger
            .account(&source)
            .await?
            .ok_or_else(|| ClientError::AccountNotFound(source.clone()))?;
        let sequence = account
            .sequence
            .checked_add(1)
            .ok_or(TxError::AmountOutOfRange)?;

        let current_ledger = self.ledger.latest_ledger().await?;
        let amount = parse_amount(&requirements.max_amount_required)?;
        let timeout = match requirements.max_timeout_seconds {
            0 => DEFAULT_TIMEOUT_SECS,
            secs => secs,
        };
        #[allow(clippy::cast_sign_loss)]
        let max_time = chrono::Utc::now().timestamp() as u64 + timeout;

        let mut transaction = if requirements.is_native() {
            tx::build_payment_transaction(
                &source,
                &requirements.pay_to,
                amount,
                sequence,
                max_time,
            )?
        } else {
            let mut transfer = tx::build_transfer_transaction(
                &source,
                &requirements.pay_to,
                &requirements.asset,
                amount,
                sequence,
                max_time,
            )?;
            self.simulate_and_prepare(&mut transfer).await?;
            transfer
        };

        // Ledger-sequence expiry mirrors the wall-clock timeout.
        let window = u32::try_from(timeout.div_ceil(LEDGER_CLOSE_SECONDS)).unwrap_or(u32::MAX);
        let valid_until_ledger = current_ledger.saturating_add(window);

        let signature = self
            .signer
            .sign(&transaction, requirements.network)
            .await?;
        tracing::debug!(
            payer = %source,
            destination = %requirements.pay_to,
            amount,
            asset = %requirements.asset,
            valid_until_ledger,
            "signed payment transaction"
        );

        let envelope = tx::envelope_with_signatures(transaction, vec![signature])?;
        let signed_tx_xdr = tx::envelope_to_base64(&envelope)?;

        Ok(PaymentPayload {
            x402_version: X402_VERSION,
            scheme: SCHEME_EXACT.to_owned(),
            network: requirements.network,
            payload: ExactStellarPayload {
                signed_tx_xdr,
                source_account: source,
                amount: requirements.max_amount_required.clone(),
                destination: requirements.pay_to.clone(),
                asset: requirements.asset.clone(),
                valid_until_ledger,
                nonce: Uuid::new_v4().to_string(),
            },
        })
    }

    /// Runs simulation for a contract transfer and folds authorization
    /// entries, resource data, and the resource fee into the transaction.
    async fn simulate_and_prepare(
        &self,
        transaction: &mut stellar_xdr::curr::Transaction,
    ) -> Result<(), ClientError> {
        let probe = tx::envelope_with_signatures(transaction.clone(), vec![])?;
        let simulation = self.ledger.simulate(&tx::envelope_to_base64(&probe)?).await?;

        if let Some(error) = simulation.error {
            return Err(ClientError::Simulation(error));
        }
        let data = simulation
            .transaction_data
            .ok_or_else(|| ClientError::Simulation("no transaction data".to_owned()))?;
        let resource_fee = simulation
            .min_resource_fee
            .as_deref()
            .unwrap_or("0")
            .parse::<u32>()
            .map_err(|e| ClientError::Simulation(format!("resource fee: {e}")))?;

        let mut auth = Vec::with_capacity(simulation.auth.len());
        for entry_b64 in &simulation.auth {
            let bytes = BASE64
                .decode(entry_b64)
                .map_err(|e| ClientError::Simulation(format!("auth entry base64: {e}")))?;
            let entry = SorobanAuthorizationEntry::from_xdr(bytes, Limits::none())
                .map_err(|e| ClientError::Simulation(format!("auth entry decode: {e}")))?;
            auth.push(entry);
        }

        tx::apply_simulation(transaction, auth, &data, resource_fee)?;
        Ok(())
    }
}
