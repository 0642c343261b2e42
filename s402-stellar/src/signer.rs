//! The transaction-signing capability.
//!
//! Two variants exist: [`LocalKeySigner`] signs synchronously from a raw
//! secret seed, and [`WalletSigner`] defers to an interactive wallet that
//! may take arbitrarily long and may be cancelled by the user. Both sign
//! plain transactions only; the trait offers no way to sign a fee-bump
//! envelope, so client code cannot be tricked into sponsoring fees.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ed25519_dalek::{Signer as _, SigningKey};
use stellar_strkey::ed25519::{PrivateKey as StrkeyPrivateKey, PublicKey as StrkeyPublicKey};
use stellar_xdr::curr::{DecoratedSignature, Signature, SignatureHint, Transaction};

use s402_proto::Network;

use crate::tx;

/// Errors from signing.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// The secret key was not a valid `S...` seed.
    #[error("invalid secret key: {0}")]
    InvalidKey(String),

    /// The user declined the signing request. Distinct from transport
    /// failures so callers can stop retrying.
    #[error("signing cancelled by user")]
    Cancelled,

    /// The wallet or signing backend failed.
    #[error("signing failed: {0}")]
    Signing(String),
}

/// What a wallet is being asked to sign.
#[derive(Debug, Clone)]
pub struct SigningRequest {
    /// The transaction to approve.
    pub transaction: Transaction,
    /// The network the signature binds to.
    pub network: Network,
    /// The precomputed signature hash.
    pub hash: [u8; 32],
}

/// Capability to identify and sign as a Stellar account.
///
/// Deliberately narrow: implementations sign inner transactions only.
#[async_trait::async_trait]
pub trait TransactionSigner: Send + Sync {
    /// The signer's account id (`G...`).
    fn public_key(&self) -> String;

    /// Produces a decorated signature over the transaction for `network`.
    async fn sign(
        &self,
        transaction: &Transaction,
        network: Network,
    ) -> Result<DecoratedSignature, SignerError>;
}

/// Synchronous signer holding a raw ed25519 seed.
#[derive(Clone)]
pub struct LocalKeySigner {
    signing_key: Arc<SigningKey>,
    public_key: String,
}

impl std::fmt::Debug for LocalKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeySigner")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl LocalKeySigner {
    /// Builds a signer from an `S...` secret seed.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::InvalidKey`] on a malformed seed.
    pub fn from_secret(secret: &str) -> Result<Self, SignerError> {
        let seed = StrkeyPrivateKey::from_string(secret)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let signing_key = SigningKey::from_bytes(&seed.0);
        let public_key = StrkeyPublicKey(signing_key.verifying_key().to_bytes()).to_string();
        Ok(Self {
            signing_key: Arc::new(signing_key),
            public_key,
        })
    }

    /// Signs a raw 32-byte signature hash.
    ///
    /// Used by the facilitator to sign fee-bump envelopes it constructed
    /// itself; the [`TransactionSigner`] trait never exposes this.
    #[must_use]
    pub fn sign_hash(&self, hash: &[u8; 32]) -> DecoratedSignature {
        let signature = self.signing_key.sign(hash);
        decorated(&self.signing_key.verifying_key().to_bytes(), signature)
    }
}

#[async_trait::async_trait]
impl TransactionSigner for LocalKeySigner {
    fn public_key(&self) -> String {
        self.public_key.clone()
    }

    async fn sign(
        &self,
        transaction: &Transaction,
        network: Network,
    ) -> Result<DecoratedSignature, SignerError> {
        let hash = tx::transaction_hash(transaction, network)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        Ok(self.sign_hash(&hash))
    }
}

type ApprovalFuture = Pin<Box<dyn Future<Output = Result<DecoratedSignature, SignerError>> + Send>>;
type ApprovalFn = dyn Fn(SigningRequest) -> ApprovalFuture + Send + Sync;

/// Asynchronous signer backed by an interactive wallet.
///
/// The approval callback presents the request to the user and resolves with
/// the wallet's signature, or [`SignerError::Cancelled`] if they decline.
pub struct WalletSigner {
    public_key: String,
    approve: Arc<ApprovalFn>,
}

impl std::fmt::Debug for WalletSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSigner")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl WalletSigner {
    /// Builds a wallet signer from the wallet's account id and an approval
    /// callback.
    pub fn new<F, Fut>(public_key: impl Into<String>, approve: F) -> Self
    where
        F: Fn(SigningRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<DecoratedSignature, SignerError>> + Send + 'static,
    {
        Self {
            public_key: public_key.into(),
            approve: Arc::new(move |request| Box::pin(approve(request))),
        }
    }
}

#[async_trait::async_trait]
impl TransactionSigner for WalletSigner {
    fn public_key(&self) -> String {
        self.public_key.clone()
    }

    async fn sign(
        &self,
        transaction: &Transaction,
        network: Network,
    ) -> Result<DecoratedSignature, SignerError> {
        let hash = tx::transaction_hash(transaction, network)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        (self.approve)(SigningRequest {
            transaction: transaction.clone(),
            network,
            hash,
        })
        .await
    }
}

/// Decorates a raw signature with the standard last-four-bytes key hint.
fn decorated(public_key: &[u8; 32], signature: ed25519_dalek::Signature) -> DecoratedSignature {
    let mut hint = [0u8; 4];
    hint.copy_from_slice(&public_key[28..32]);
    DecoratedSignature {
        hint: SignatureHint(hint),
        signature: Signature(
            signature
                .to_bytes()
                .to_vec()
                .try_into()
                .expect("64-byte signature fits the XDR bound"),
        ),
    }
}
