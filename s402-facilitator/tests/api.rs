//! Endpoint-level tests for the facilitator REST surface.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use s402::error::PaymentError;
use s402::facilitator::Facilitator;
use s402::proto::{
    ErrorReason, Network, SettleRequest, SettleResponse, SupportedKind, SupportedResponse,
    VerifyRequest, VerifyResponse,
};
use s402::store::MemoryStore;
use s402_facilitator::handlers::{facilitator_router, AppState};

const PAYER: &str = "GAAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQDZ7H";

/// Engine stub that answers with canned protocol outcomes.
struct CannedEngine {
    verify: VerifyResponse,
    settle: SettleResponse,
}

#[async_trait::async_trait]
impl Facilitator for CannedEngine {
    async fn verify(&self, _request: &VerifyRequest) -> Result<VerifyResponse, PaymentError> {
        Ok(self.verify.clone())
    }

    async fn settle(&self, _request: &SettleRequest) -> Result<SettleResponse, PaymentError> {
        Ok(self.settle.clone())
    }

    async fn supported(&self) -> Result<SupportedResponse, PaymentError> {
        Ok(SupportedResponse {
            kinds: vec![SupportedKind {
                scheme: "exact".to_owned(),
                network: Network::StellarTestnet,
                extra: Some(json!({"feeSponsorship": false})),
            }],
        })
    }
}

fn app(verify: VerifyResponse, settle: SettleResponse) -> axum::Router {
    facilitator_router(AppState {
        facilitator: Arc::new(CannedEngine { verify, settle }),
        discovery: Arc::new(MemoryStore::new()),
    })
}

fn accepting_app() -> axum::Router {
    app(
        VerifyResponse::valid(PAYER),
        SettleResponse::success("ab12", Network::StellarTestnet, PAYER),
    )
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn verify_body() -> Value {
    json!({
        "x402Version": 1,
        "paymentPayload": {
            "x402Version": 1,
            "scheme": "exact",
            "network": "stellar-testnet",
            "payload": {
                "signedTxXdr": "AAAA",
                "sourceAccount": PAYER,
                "amount": "10000000",
                "destination": "GB3KJPLFUYN5VL6R3GU3EGCGVCKFDSD7BEDX42HWG5BWFKB3KQGJJRMA",
                "asset": "native",
                "validUntilLedger": 100,
                "nonce": "0b99ee6c-9f1a-41a0-b591-66d64e8e9f52"
            }
        },
        "paymentRequirements": requirements_json("https://api.example.com/data")
    })
}

fn requirements_json(resource: &str) -> Value {
    json!({
        "scheme": "exact",
        "network": "stellar-testnet",
        "maxAmountRequired": "10000000",
        "resource": resource,
        "payTo": "GB3KJPLFUYN5VL6R3GU3EGCGVCKFDSD7BEDX42HWG5BWFKB3KQGJJRMA",
        "maxTimeoutSeconds": 300,
        "asset": "native"
    })
}

#[tokio::test]
async fn verify_returns_200_for_valid_and_invalid() {
    let response = accepting_app()
        .oneshot(json_request("POST", "/verify", verify_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["isValid"], true);
    assert_eq!(body["payer"], PAYER);

    let rejecting = app(
        VerifyResponse::invalid(ErrorReason::AmountMismatch),
        SettleResponse::error(ErrorReason::TransactionFailed, Network::StellarTestnet),
    );
    let response = rejecting
        .oneshot(json_request("POST", "/verify", verify_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["isValid"], false);
    assert_eq!(
        body["invalidReason"],
        "invalid_exact_stellar_payload_amount_mismatch"
    );
}

#[tokio::test]
async fn settle_reports_transaction_hash() {
    let response = accepting_app()
        .oneshot(json_request("POST", "/settle", verify_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["transaction"], "ab12");
    assert_eq!(body["network"], "stellar-testnet");
}

#[tokio::test]
async fn supported_lists_kinds() {
    let response = accepting_app().oneshot(get_request("/supported")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["kinds"][0]["scheme"], "exact");
    assert_eq!(body["kinds"][0]["network"], "stellar-testnet");
}

#[tokio::test]
async fn discovery_register_list_get_unregister() {
    let app = accepting_app();

    for i in 0..3 {
        let body = json!({
            "resource": format!("https://api.example.com/r{i}"),
            "type": if i == 2 { "mcp" } else { "http" },
            "accepts": [requirements_json(&format!("https://api.example.com/r{i}"))],
            "metadata": {"index": i}
        });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/discovery/resources", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let entry = json_body(response).await;
        assert!(entry["lastUpdated"].is_string());
    }

    // Listing is newest-first with totals.
    let response = app
        .clone()
        .oneshot(get_request("/discovery/resources?limit=2"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["total"], 3);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["items"][0]["resource"], "https://api.example.com/r2");

    // Type filter.
    let response = app
        .clone()
        .oneshot(get_request("/discovery/resources?type=mcp"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["items"][0]["type"], "mcp");

    // Point lookup.
    let response = app
        .clone()
        .oneshot(get_request(
            "/discovery/resources?resource=https%3A%2F%2Fapi.example.com%2Fr1",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["resource"], "https://api.example.com/r1");

    // Unregister, then the same delete 404s.
    let delete = json!({"resource": "https://api.example.com/r1"});
    let response = app
        .clone()
        .oneshot(json_request("DELETE", "/discovery/resources", delete.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(json_request("DELETE", "/discovery/resources", delete))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reregistering_updates_timestamp_and_order() {
    let app = accepting_app();
    for resource in ["https://a", "https://b"] {
        let body = json!({
            "resource": resource,
            "type": "http",
            "accepts": []
        });
        app.clone()
            .oneshot(json_request("POST", "/discovery/resources", body))
            .await
            .unwrap();
    }

    // Re-register the older entry; it should move to the front.
    let body = json!({"resource": "https://a", "type": "http", "accepts": []});
    app.clone()
        .oneshot(json_request("POST", "/discovery/resources", body))
        .await
        .unwrap();

    let response = app
        .oneshot(get_request("/discovery/resources"))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["items"][0]["resource"], "https://a");
}

#[tokio::test]
async fn health_reports_version() {
    let response = accepting_app().oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}
