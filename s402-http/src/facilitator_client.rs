//! HTTP client for a remote facilitator service.
//!
//! [`HttpFacilitator`] implements [`s402::Facilitator`] by POSTing
//! verify/settle requests to a facilitator's REST surface. Protocol-level
//! rejections arrive as 200 responses with `isValid=false`/`success=false`;
//! only transport and server failures become errors, which the gate turns
//! into 500s.

use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use url::Url;

use s402::error::PaymentError;
use s402::facilitator::Facilitator;
use s402::proto::{
    SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse,
};

/// Default TTL for the cached `GET /supported` response.
const DEFAULT_SUPPORTED_TTL: Duration = Duration::from_secs(600);

/// Async HTTP client for a facilitator service.
pub struct HttpFacilitator {
    base_url: Url,
    client: reqwest::Client,
    supported_ttl: Option<Duration>,
    supported_cache: RwLock<Option<(Instant, SupportedResponse)>>,
}

impl std::fmt::Debug for HttpFacilitator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFacilitator")
            .field("base_url", &self.base_url)
            .field("supported_ttl", &self.supported_ttl)
            .finish_non_exhaustive()
    }
}

impl HttpFacilitator {
    /// Creates a client for the facilitator at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Transport`] if the URL is invalid.
    pub fn try_new(base_url: &str) -> Result<Self, PaymentError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PaymentError::Transport(format!("invalid facilitator URL: {e}")))?;
        Ok(Self {
            base_url,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| PaymentError::Transport(e.to_string()))?,
            supported_ttl: Some(DEFAULT_SUPPORTED_TTL),
            supported_cache: RwLock::new(None),
        })
    }

    /// Sets the TTL for caching the supported-kinds response.
    #[must_use]
    pub fn with_supported_cache_ttl(mut self, ttl: Duration) -> Self {
        self.supported_ttl = Some(ttl);
        self
    }

    /// Disables supported-kinds caching entirely.
    #[must_use]
    pub fn without_supported_cache(mut self) -> Self {
        self.supported_ttl = None;
        self
    }

    /// The facilitator base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, PaymentError>
    where
        B: serde::Serialize + Sync,
        R: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(|e| PaymentError::Transport(format!("facilitator {path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PaymentError::Transport(format!(
                "facilitator {path} returned {status}: {text}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PaymentError::Transport(format!("facilitator {path} parse: {e}")))
    }

    /// Fetches the supported-kinds response, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Transport`] on network or server failure.
    pub async fn supported_inner(&self) -> Result<SupportedResponse, PaymentError> {
        let response = self
            .client
            .get(self.endpoint("supported"))
            .send()
            .await
            .map_err(|e| PaymentError::Transport(format!("facilitator supported: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaymentError::Transport(format!(
                "facilitator supported returned {status}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PaymentError::Transport(format!("facilitator supported parse: {e}")))
    }
}

#[async_trait::async_trait]
impl Facilitator for HttpFacilitator {
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, PaymentError> {
        self.post("verify", request).await
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, PaymentError> {
        self.post("settle", request).await
    }

    async fn supported(&self) -> Result<SupportedResponse, PaymentError> {
        if let Some(ttl) = self.supported_ttl {
            if let Some((fetched_at, cached)) = self.supported_cache.read().await.as_ref() {
                if fetched_at.elapsed() < ttl {
                    return Ok(cached.clone());
                }
            }
            let fresh = self.supported_inner().await?;
            *self.supported_cache.write().await = Some((Instant::now(), fresh.clone()));
            return Ok(fresh);
        }
        self.supported_inner().await
    }
}
