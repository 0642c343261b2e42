//! The s402 facilitator service.
//!
//! Exposes the facilitator REST surface (`/verify`, `/settle`,
//! `/supported`, `/discovery/resources`) over the Stellar exact-scheme
//! engine, with a SQLite-backed replay and discovery store shared by all
//! workers.

pub mod config;
pub mod error;
pub mod handlers;
pub mod store;

pub use config::FacilitatorConfig;
pub use handlers::{facilitator_router, AppState};
pub use store::SqliteStore;
