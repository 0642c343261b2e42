//! HTTP integration for the s402 payment protocol.
//!
//! Provides the resource-server side of the protocol:
//!
//! - [`gate`] — Tower middleware that challenges unpaid requests, verifies
//!   payments, buffers handler output, and settles before releasing it
//! - [`routes`] — Route rules mapping path patterns to prices
//! - [`facilitator_client`] — HTTP client for a remote facilitator service
//! - [`paywall`] — Browser detection and the HTML paywall hook

pub mod facilitator_client;
pub mod gate;
pub mod paywall;
pub mod routes;

pub use facilitator_client::HttpFacilitator;
pub use gate::PaymentGate;
pub use paywall::PaywallRenderer;
pub use routes::{Price, RouteRule, RouteTable};
