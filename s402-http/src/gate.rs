//! The payment gate: tower middleware enforcing payment on priced routes.
//!
//! For each request the gate consults its route table. Unpriced routes pass
//! straight through. Priced requests without an `X-Payment` header receive
//! a 402 challenge. Paid requests are verified with the facilitator before
//! the protected handler runs; the handler's output is then buffered in
//! full and released only after settlement succeeds, with the settlement
//! outcome attached as the `X-Payment-Response` header. A handler error or
//! a failed settlement never leaks a byte of the buffered body.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use url::Url;

use s402::error::PaymentError;
use s402::facilitator::Facilitator;
use s402::proto::{
    ErrorReason, Network, PaymentPayload, PaymentRequired, PaymentRequirements, SettleRequest,
    VerifyRequest, PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER, X402_VERSION,
};

use crate::paywall::{wants_html, PaywallRenderer};
use crate::routes::{RouteRule, RouteTable};

/// Builder and [`Layer`] for the payment gate.
///
/// Configure once at startup and layer it over the routes to protect:
///
/// ```no_run
/// use s402_http::{HttpFacilitator, PaymentGate, RouteRule};
/// use s402::proto::Network;
///
/// let facilitator = std::sync::Arc::new(HttpFacilitator::try_new("https://fac.example.com").unwrap());
/// let gate = PaymentGate::new(
///     facilitator,
///     Network::StellarTestnet,
///     "GB3KJPLFUYN5VL6R3GU3EGCGVCKFDSD7BEDX42HWG5BWFKB3KQGJJRMA",
/// )
/// .with_route(RouteRule::new("GET /api/weather", "0.1").unwrap());
/// ```
pub struct PaymentGate<F> {
    facilitator: F,
    table: RouteTable,
    network: Network,
    pay_to: String,
    base_url: Option<Url>,
    paywall: Option<Arc<dyn PaywallRenderer>>,
}

impl<F: Clone> Clone for PaymentGate<F> {
    fn clone(&self) -> Self {
        Self {
            facilitator: self.facilitator.clone(),
            table: self.table.clone(),
            network: self.network,
            pay_to: self.pay_to.clone(),
            base_url: self.base_url.clone(),
            paywall: self.paywall.clone(),
        }
    }
}

impl<F> std::fmt::Debug for PaymentGate<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGate")
            .field("network", &self.network)
            .field("pay_to", &self.pay_to)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl<F> PaymentGate<F> {
    /// Creates a gate paying out to `pay_to` on `network`.
    pub fn new(facilitator: F, network: Network, pay_to: impl Into<String>) -> Self {
        Self {
            facilitator,
            table: RouteTable::new(),
            network,
            pay_to: pay_to.into(),
            base_url: None,
            paywall: None,
        }
    }

    /// Adds a pricing rule.
    #[must_use]
    pub fn with_route(mut self, rule: RouteRule) -> Self {
        self.table = std::mem::take(&mut self.table).with_rule(rule);
        self
    }

    /// Sets the base URL used to build absolute resource URLs in
    /// challenges. Without it, the request's `Host` header is used.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Installs an HTML paywall renderer for browser callers.
    #[must_use]
    pub fn with_paywall(mut self, renderer: Arc<dyn PaywallRenderer>) -> Self {
        self.paywall = Some(renderer);
        self
    }
}

/// Gate state shared by every in-flight request.
struct GateShared<F> {
    facilitator: F,
    table: RouteTable,
    network: Network,
    pay_to: String,
    base_url: Option<Url>,
    paywall: Option<Arc<dyn PaywallRenderer>>,
}

impl<S, F> Layer<S> for PaymentGate<F>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    F: Facilitator + Clone,
{
    type Service = PaymentGateService<F>;

    fn layer(&self, inner: S) -> Self::Service {
        PaymentGateService {
            shared: Arc::new(GateShared {
                facilitator: self.facilitator.clone(),
                table: self.table.clone(),
                network: self.network,
                pay_to: self.pay_to.clone(),
                base_url: self.base_url.clone(),
                paywall: self.paywall.clone(),
            }),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// The service produced by [`PaymentGate`].
pub struct PaymentGateService<F> {
    shared: Arc<GateShared<F>>,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<F> Clone for PaymentGateService<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            inner: self.inner.clone(),
        }
    }
}

impl<F> Service<Request> for PaymentGateService<F>
where
    F: Facilitator + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let shared = Arc::clone(&self.shared);
        let inner = self.inner.clone();
        Box::pin(async move { Ok(handle(shared, inner, req).await) })
    }
}

/// Runs one request through the payment state machine.
async fn handle<F: Facilitator>(
    shared: Arc<GateShared<F>>,
    mut inner: BoxCloneSyncService<Request, Response, Infallible>,
    req: Request,
) -> Response {
    let Some(rule) = shared.table.matching(req.method(), req.uri().path()) else {
        return call_inner(&mut inner, req).await;
    };

    let resource = shared.resource_url(&req);
    let requirements = match rule.requirements(shared.network, &shared.pay_to, &resource) {
        Ok(requirements) => requirements,
        Err(e) => {
            tracing::error!(resource = %resource, error = %e, "route rule produced invalid requirements");
            return server_error();
        }
    };

    // No header: challenge the caller.
    let Some(header) = req.headers().get(PAYMENT_HEADER) else {
        return shared.challenge(req.headers(), requirements);
    };

    let payload = match PaymentPayload::from_header(header.as_bytes()) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(error = %e, "malformed payment header");
            return reject(requirements, ErrorReason::InvalidPayload.as_str());
        }
    };

    let verify_request = VerifyRequest {
        x402_version: X402_VERSION,
        payment_payload: payload,
        payment_requirements: requirements.clone(),
    };
    let verdict = match shared.facilitator.verify(&verify_request).await {
        Ok(verdict) => verdict,
        Err(e) => return transport_error("verify", &e),
    };
    if !verdict.is_valid {
        let reason = verdict
            .invalid_reason
            .map_or("invalid_payment", ErrorReason::as_str);
        return reject(requirements, reason);
    }

    // Run the protected handler with its entire output buffered.
    let response = call_inner(&mut inner, req).await;
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        // Handler failed: release as-is, capture no payment.
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "failed to buffer handler response");
            return server_error();
        }
    };

    let settlement = match shared.facilitator.settle(&verify_request.into()).await {
        Ok(settlement) => settlement,
        Err(e) => return transport_error("settle", &e),
    };
    if !settlement.success {
        // Buffered bytes are discarded; the caller was not charged.
        let reason = settlement
            .error_reason
            .map_or("unexpected_settle_error", ErrorReason::as_str);
        tracing::warn!(resource = %requirements.resource, reason, "settlement failed");
        return reject(requirements, reason);
    }

    let header_value = settlement
        .to_header()
        .ok()
        .and_then(|value| HeaderValue::from_str(&value).ok());
    let Some(header_value) = header_value else {
        tracing::error!("settlement result did not encode as a header");
        return server_error();
    };

    let mut released = Response::from_parts(parts, Body::from(bytes));
    released
        .headers_mut()
        .insert(PAYMENT_RESPONSE_HEADER, header_value);
    released
}

async fn call_inner(
    inner: &mut BoxCloneSyncService<Request, Response, Infallible>,
    req: Request,
) -> Response {
    match inner.call(req).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

impl<F> GateShared<F> {
    /// Absolute URL of the requested resource.
    fn resource_url(&self, req: &Request) -> String {
        if let Some(base) = &self.base_url {
            let mut url = base.clone();
            url.set_path(req.uri().path());
            url.set_query(req.uri().query());
            return url.to_string();
        }
        let host = req
            .headers()
            .get(http::header::HOST)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("localhost");
        format!("http://{host}{}", req.uri())
    }

    /// The 402 challenge for an unpaid request: HTML for browsers when a
    /// paywall is installed, JSON otherwise.
    fn challenge(
        &self,
        headers: &http::HeaderMap,
        requirements: PaymentRequirements,
    ) -> Response {
        let body = PaymentRequired::new(vec![requirements]);
        if let Some(renderer) = &self.paywall {
            if wants_html(headers) {
                return (
                    StatusCode::PAYMENT_REQUIRED,
                    [(CONTENT_TYPE, "text/html; charset=utf-8")],
                    renderer.render(&body),
                )
                    .into_response();
            }
        }
        (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response()
    }
}

/// A 402 carrying a rejection reason alongside the challenge.
fn reject(requirements: PaymentRequirements, reason: &str) -> Response {
    (
        StatusCode::PAYMENT_REQUIRED,
        Json(PaymentRequired::with_error(vec![requirements], reason)),
    )
        .into_response()
}

fn transport_error(operation: &str, error: &PaymentError) -> Response {
    tracing::error!(operation, error = %error, "facilitator unreachable");
    server_error()
}

fn server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "payment processing failed" })),
    )
        .into_response()
}
