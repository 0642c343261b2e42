//! Discovery catalog entries.
//!
//! Facilitators may expose a catalog of known paid resources so that
//! clients can find them. Entries are keyed by resource URL; re-registering
//! a URL overwrites the previous entry and refreshes its timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::requirements::PaymentRequirements;

/// Default page size for discovery listings.
pub const DEFAULT_DISCOVERY_LIMIT: u32 = 20;

/// Maximum page size for discovery listings.
pub const MAX_DISCOVERY_LIMIT: u32 = 100;

/// A discoverable paid resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryEntry {
    /// Absolute URL of the resource. Catalog key.
    pub resource: String,

    /// Resource category (e.g. `"http"`, `"api"`).
    pub r#type: String,

    /// Payment requirements the resource accepts.
    pub accepts: Vec<PaymentRequirements>,

    /// When the entry was last registered or updated.
    pub last_updated: DateTime<Utc>,

    /// Free-form metadata supplied at registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Body of `POST /discovery/resources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Absolute URL of the resource.
    pub resource: String,

    /// Resource category.
    pub r#type: String,

    /// Payment requirements the resource accepts.
    pub accepts: Vec<PaymentRequirements>,

    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Body of `DELETE /discovery/resources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterRequest {
    /// URL of the resource to remove.
    pub resource: String,
}

/// Response of `GET /discovery/resources`: one page, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryListResponse {
    /// Entries on this page, sorted by `lastUpdated` descending.
    pub items: Vec<DiscoveryEntry>,

    /// Effective page size.
    pub limit: u32,

    /// Offset this page starts at.
    pub offset: u32,

    /// Total number of entries matching the filter.
    pub total: u64,
}

/// Clamps a requested page size to the allowed range.
#[must_use]
pub fn clamp_limit(requested: Option<u32>) -> u32 {
    requested
        .unwrap_or(DEFAULT_DISCOVERY_LIMIT)
        .clamp(1, MAX_DISCOVERY_LIMIT)
}
