//! Stellar implementation of the s402 payment protocol.
//!
//! This crate contains everything that touches the Stellar ledger:
//!
//! - [`ledger`] — A narrow adapter over Horizon and Soroban RPC
//! - [`tx`] — Transaction XDR helpers: parse, hash, fee-bump, contract calls
//! - [`signer`] — The transaction-signing capability and its variants
//! - [`client`] — The client-side payment builder
//! - [`exact`] — The facilitator-side verify/settle engine for the `exact` scheme
//!
//! Everything above the [`ledger::LedgerOps`] trait is ledger-SDK-agnostic;
//! only this crate links `stellar-xdr` and friends.

pub mod client;
pub mod exact;
pub mod ledger;
pub mod signer;
pub mod tx;

pub use client::{ClientError, PaymentBuilder};
pub use exact::{ExactStellarConfig, ExactStellarFacilitator};
pub use ledger::{AccountEntry, HttpLedger, LedgerError, LedgerOps, TrustLine};
pub use signer::{LocalKeySigner, SignerError, SigningRequest, TransactionSigner, WalletSigner};
