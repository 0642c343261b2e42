//! Axum route handlers for the facilitator service.
//!
//! Protocol endpoints return HTTP 200 whenever the protocol produced an
//! answer, including rejections (`isValid=false`, `success=false`);
//! non-200 statuses are reserved for transport and server failures.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use s402::facilitator::Facilitator;
use s402::proto::discovery::clamp_limit;
use s402::proto::{
    DiscoveryEntry, DiscoveryListResponse, RegisterRequest, SettleRequest, SettleResponse,
    SupportedResponse, UnregisterRequest, VerifyRequest, VerifyResponse,
};
use s402::store::DiscoveryStore;

use crate::error::FacilitatorError;

/// Shared state for all facilitator routes.
#[derive(Clone)]
pub struct AppState {
    /// The verify/settle engine.
    pub facilitator: Arc<dyn Facilitator>,
    /// The discovery catalog.
    pub discovery: Arc<dyn DiscoveryStore>,
}

/// `POST /verify` — verifies a payment payload against requirements.
///
/// # Errors
///
/// Returns 500 only on transport failures below the protocol.
pub async fn post_verify(
    State(state): State<AppState>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, FacilitatorError> {
    let result = state.facilitator.verify(&body).await?;
    Ok(Json(result))
}

/// `POST /settle` — settles a payment on the ledger.
///
/// # Errors
///
/// Returns 500 only on transport failures below the protocol.
pub async fn post_settle(
    State(state): State<AppState>,
    Json(body): Json<SettleRequest>,
) -> Result<Json<SettleResponse>, FacilitatorError> {
    let result = state.facilitator.settle(&body).await?;
    Ok(Json(result))
}

/// `GET /supported` — lists the `(scheme, network)` pairs served here.
///
/// # Errors
///
/// Returns 500 if the engine cannot enumerate its capabilities.
pub async fn get_supported(
    State(state): State<AppState>,
) -> Result<Json<SupportedResponse>, FacilitatorError> {
    Ok(Json(state.facilitator.supported().await?))
}

/// Query parameters for `GET /discovery/resources`.
#[derive(Debug, Deserialize)]
pub struct DiscoveryQuery {
    /// Filter by resource type.
    #[serde(default, rename = "type")]
    pub r#type: Option<String>,

    /// Page size (default 20, max 100).
    #[serde(default)]
    pub limit: Option<u32>,

    /// Page offset.
    #[serde(default)]
    pub offset: Option<u32>,

    /// When present, fetch this single resource instead of a page.
    #[serde(default)]
    pub resource: Option<String>,
}

/// `GET /discovery/resources` — pages through the catalog, newest first.
/// With `?resource=`, fetches one entry.
///
/// # Errors
///
/// Returns 404 for an unknown `resource`, 500 on store failure.
pub async fn get_discovery_resources(
    State(state): State<AppState>,
    Query(query): Query<DiscoveryQuery>,
) -> Result<axum::response::Response, FacilitatorError> {
    if let Some(resource) = &query.resource {
        let entry = state
            .discovery
            .get(resource)
            .await?
            .ok_or(FacilitatorError::NotFound)?;
        return Ok(Json(entry).into_response());
    }

    let limit = clamp_limit(query.limit);
    let offset = query.offset.unwrap_or(0);
    let (items, total) = state
        .discovery
        .list(query.r#type.as_deref(), limit, offset)
        .await?;
    Ok(Json(DiscoveryListResponse {
        items,
        limit,
        offset,
        total,
    })
    .into_response())
}

/// `POST /discovery/resources` — registers or overwrites an entry, keyed
/// by resource URL, stamping `lastUpdated` with the current time.
///
/// # Errors
///
/// Returns 500 on store failure.
pub async fn post_discovery_resources(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<DiscoveryEntry>, FacilitatorError> {
    let entry = DiscoveryEntry {
        resource: body.resource,
        r#type: body.r#type,
        accepts: body.accepts,
        last_updated: chrono::Utc::now(),
        metadata: body.metadata,
    };
    state.discovery.register(entry.clone()).await?;
    tracing::info!(resource = %entry.resource, r#type = %entry.r#type, "registered resource");
    Ok(Json(entry))
}

/// `DELETE /discovery/resources` — removes an entry by resource URL.
///
/// # Errors
///
/// Returns 404 if the resource was never registered.
pub async fn delete_discovery_resources(
    State(state): State<AppState>,
    Json(body): Json<UnregisterRequest>,
) -> Result<StatusCode, FacilitatorError> {
    if state.discovery.unregister(&body.resource).await? {
        tracing::info!(resource = %body.resource, "unregistered resource");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(FacilitatorError::NotFound)
    }
}

/// `GET /health` — liveness probe.
pub async fn get_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Builds the complete facilitator [`Router`].
pub fn facilitator_router(state: AppState) -> Router {
    Router::new()
        .route("/verify", post(post_verify))
        .route("/settle", post(post_settle))
        .route("/supported", get(get_supported))
        .route(
            "/discovery/resources",
            get(get_discovery_resources)
                .post(post_discovery_resources)
                .delete(delete_discovery_resources),
        )
        .route("/health", get(get_health))
        .with_state(state)
}
