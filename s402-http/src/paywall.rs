//! Browser detection and the HTML paywall hook.
//!
//! The gate serves a JSON challenge by default. When the caller looks like
//! an interactive browser and the host application has installed a
//! [`PaywallRenderer`], the challenge is rendered as HTML instead. The gate
//! never ships markup of its own.

use http::header::{ACCEPT, USER_AGENT};
use http::HeaderMap;

use s402::proto::PaymentRequired;

/// Renders an HTML paywall page for a challenge.
///
/// Implemented by the host application (or an external paywall crate); the
/// gate only decides *when* to call it.
pub trait PaywallRenderer: Send + Sync {
    /// Produces the full HTML document for the challenge.
    fn render(&self, required: &PaymentRequired) -> String;
}

impl<F> PaywallRenderer for F
where
    F: Fn(&PaymentRequired) -> String + Send + Sync,
{
    fn render(&self, required: &PaymentRequired) -> String {
        self(required)
    }
}

/// Whether the request looks like an interactive browser asking for HTML.
#[must_use]
pub fn wants_html(headers: &HeaderMap) -> bool {
    let accepts_html = headers
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"));
    let browser_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|agent| agent.contains("Mozilla"));
    accepts_html && browser_agent
}
