//! s402 payment protocol core for Rust.
//!
//! This crate provides the core traits and abstractions for the s402
//! payment protocol on Stellar. It re-exports all wire format types from
//! [`s402_proto`] and adds:
//!
//! - [`facilitator`] — The `Facilitator` capability (verify / settle / supported)
//! - [`store`] — Replay and discovery store contracts plus the in-memory fallback
//! - [`error`] — Domain-specific error types

pub mod error;
pub mod facilitator;
pub mod store;

/// Re-export all wire format types from `s402-proto`.
pub use s402_proto as proto;
pub use s402_proto::*;

pub use error::{PaymentError, SettleError, VerifyError};
pub use facilitator::Facilitator;
pub use store::{DiscoveryStore, MemoryStore, ReplayStore};
