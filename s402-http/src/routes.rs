//! Route rules: which requests are paid, and how much.
//!
//! A rule pairs an optional verb with a glob-style path pattern and a
//! price. Patterns compile to anchored regular expressions: `*` matches any
//! run of characters, `[name]` matches a single path segment, and all other
//! regex metacharacters are escaped. Among several matching rules the most
//! specific one wins: the pattern carrying the most fixed text, where a
//! `[name]` segment outweighs a `*` and literal characters outweigh both,
//! so `/a/b` beats `/a/[x]` beats `/a/*`.

use http::Method;
use regex::Regex;

use s402::proto::amount::{decimal_to_atomic, NATIVE_DECIMALS};
use s402::proto::{
    Network, PaymentRequirements, ProtocolError, NATIVE_ASSET, SCHEME_EXACT,
};

/// Default payment validity window when a rule does not override it.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// A price, either already in the asset's smallest unit or as a
/// human-readable decimal string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Price {
    /// Amount in the asset's smallest unit, passed through unchanged.
    Atomic(u64),

    /// Decimal string: `"1.5"` scales by the asset's decimal count;
    /// whole-number strings pass through as smallest-unit amounts.
    Text(String),
}

impl Price {
    /// Resolves the price to a smallest-unit amount string.
    fn to_amount(&self, decimals: u32) -> Result<String, ProtocolError> {
        match self {
            Self::Atomic(amount) => Ok(amount.to_string()),
            Self::Text(text) => Ok(decimal_to_atomic(text, decimals)?.to_string()),
        }
    }
}

impl From<u64> for Price {
    fn from(amount: u64) -> Self {
        Self::Atomic(amount)
    }
}

impl From<&str> for Price {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

/// One entry of the gate's pricing table.
#[derive(Debug, Clone)]
pub struct RouteRule {
    method: Option<Method>,
    specificity: usize,
    regex: Regex,
    price: Price,
    asset: Option<String>,
    asset_decimals: u32,
    description: Option<String>,
    mime_type: Option<String>,
    max_timeout_seconds: u64,
}

impl RouteRule {
    /// Creates a rule from a pattern and a price.
    ///
    /// The pattern is an optional verb followed by a path pattern, e.g.
    /// `"/api/*"`, `"GET /api/weather"`, or `"* /files/[name]"`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidRequirements`] on an unparseable
    /// pattern or verb.
    pub fn new(pattern: &str, price: impl Into<Price>) -> Result<Self, ProtocolError> {
        let (verb, path) = match pattern.split_once(' ') {
            Some((verb, path)) => (Some(verb), path.trim_start()),
            None => (None, pattern),
        };
        let method = match verb {
            None | Some("*") => None,
            Some(verb) => Some(
                verb.parse::<Method>()
                    .map_err(|_| ProtocolError::InvalidRequirements("unknown method"))?,
            ),
        };
        let (compiled, specificity) = compile_pattern(path);
        let regex = Regex::new(&compiled)
            .map_err(|_| ProtocolError::InvalidRequirements("pattern does not compile"))?;

        Ok(Self {
            method,
            specificity,
            regex,
            price: price.into(),
            asset: None,
            asset_decimals: NATIVE_DECIMALS,
            description: None,
            mime_type: None,
            max_timeout_seconds: DEFAULT_TIMEOUT_SECS,
        })
    }

    /// Prices the rule in a contract asset instead of the native asset.
    #[must_use]
    pub fn with_asset(mut self, contract_id: impl Into<String>, decimals: u32) -> Self {
        self.asset = Some(contract_id.into());
        self.asset_decimals = decimals;
        self
    }

    /// Sets the human-readable description included in challenges.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the MIME type advertised in challenges.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Overrides the payment validity window.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.max_timeout_seconds = seconds;
        self
    }

    /// Whether this rule applies to the given verb and normalized path.
    fn matches(&self, method: &Method, normalized_path: &str) -> bool {
        if let Some(required) = &self.method {
            if required != method {
                return false;
            }
        }
        self.regex.is_match(normalized_path)
    }

    /// Builds the payment requirements this rule demands for a resource.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the price does not resolve to a valid
    /// amount.
    pub fn requirements(
        &self,
        network: Network,
        pay_to: &str,
        resource: &str,
    ) -> Result<PaymentRequirements, ProtocolError> {
        let asset = self.asset.clone().unwrap_or_else(|| NATIVE_ASSET.to_owned());
        let requirements = PaymentRequirements {
            scheme: SCHEME_EXACT.to_owned(),
            network,
            max_amount_required: self.price.to_amount(self.asset_decimals)?,
            resource: resource.to_owned(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            pay_to: pay_to.to_owned(),
            max_timeout_seconds: self.max_timeout_seconds,
            asset,
            extra: None,
        };
        requirements.validate()?;
        Ok(requirements)
    }
}

/// The gate's pricing table. Read-only after startup.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule.
    #[must_use]
    pub fn with_rule(mut self, rule: RouteRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Whether the table has no rules at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Finds the most specific rule for a request, if any.
    ///
    /// The raw request path is normalized first; among matches, the rule
    /// with the highest specificity (most fixed pattern text) wins.
    #[must_use]
    pub fn matching(&self, method: &Method, raw_path: &str) -> Option<&RouteRule> {
        let path = normalize_path(raw_path);
        self.rules
            .iter()
            .filter(|rule| rule.matches(method, &path))
            .max_by_key(|rule| rule.specificity)
    }
}

/// Normalizes a request path: strips query and fragment, collapses
/// redundant slashes, and drops the trailing slash.
#[must_use]
pub fn normalize_path(raw: &str) -> String {
    let without_query = raw
        .split_once(['?', '#'])
        .map_or(raw, |(path, _)| path);

    let mut normalized = String::with_capacity(without_query.len() + 1);
    if !without_query.starts_with('/') {
        normalized.push('/');
    }
    let mut last_was_slash = false;
    for ch in without_query.chars() {
        if ch == '/' {
            if !last_was_slash {
                normalized.push('/');
            }
            last_was_slash = true;
        } else {
            normalized.push(ch);
            last_was_slash = false;
        }
    }
    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Compiles a glob pattern to an anchored regular expression:
/// `*` → `.*?`, `[name]` → `[^/]+`, everything else escaped.
///
/// Also returns the pattern's specificity: literal characters score 2,
/// `[name]` segments score 1, and `*` scores 0, so fixed text always beats
/// a parameter and a parameter always beats a wildcard.
fn compile_pattern(pattern: &str) -> (String, usize) {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut specificity = 0;
    out.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => out.push_str(".*?"),
            '[' => {
                // Consume the parameter name up to the closing bracket; a
                // bracket with no close is treated literally.
                let mut name = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == ']' {
                        closed = true;
                        break;
                    }
                    name.push(inner);
                }
                if closed {
                    out.push_str("[^/]+");
                    specificity += 1;
                } else {
                    out.push_str(&regex::escape("["));
                    out.push_str(&regex::escape(&name));
                    specificity += 2 * (name.chars().count() + 1);
                }
            }
            other => {
                out.push_str(&regex::escape(&other.to_string()));
                specificity += 2;
            }
        }
    }
    out.push('$');
    (out, specificity)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAY_TO: &str = "GB3KJPLFUYN5VL6R3GU3EGCGVCKFDSD7BEDX42HWG5BWFKB3KQGJJRMA";
    const CONTRACT: &str = "CDLZFC3SYJYDZT7K67VZ75HPJVIEUVNIXF47ZG2FB2RMQQVU2HHGCYSC";

    fn table() -> RouteTable {
        RouteTable::new()
            .with_rule(RouteRule::new("/a/*", "1").unwrap())
            .with_rule(RouteRule::new("/a/b", "2").unwrap())
            .with_rule(RouteRule::new("GET /files/[name]", 500).unwrap())
    }

    #[test]
    fn longest_pattern_wins() {
        let table = table();
        let rule = table.matching(&Method::GET, "/a/b").unwrap();
        assert_eq!(rule.price, Price::Text("2".to_owned()));

        let rule = table.matching(&Method::GET, "/a/c").unwrap();
        assert_eq!(rule.price, Price::Text("1".to_owned()));
    }

    #[test]
    fn normalization_is_idempotent_across_spellings() {
        let table = table();
        for spelling in ["/a/b", "/a//b/", "/a/b?q=1", "/a/b#frag", "//a/b"] {
            let rule = table.matching(&Method::POST, spelling).unwrap();
            assert_eq!(rule.price, Price::Text("2".to_owned()), "for {spelling}");
        }
    }

    #[test]
    fn params_match_single_segments() {
        let table = table();
        assert!(table.matching(&Method::GET, "/files/report.pdf").is_some());
        assert!(table.matching(&Method::GET, "/files/a/b").is_none());
        assert!(table.matching(&Method::GET, "/files/").is_none());
    }

    #[test]
    fn verb_filter_applies() {
        let table = table();
        assert!(table.matching(&Method::POST, "/files/report.pdf").is_none());
        // `/a/*` has no verb filter.
        assert!(table.matching(&Method::DELETE, "/a/x").is_some());
    }

    #[test]
    fn metacharacters_are_escaped() {
        let table = RouteTable::new().with_rule(RouteRule::new("/v1.0/data", 1).unwrap());
        assert!(table.matching(&Method::GET, "/v1.0/data").is_some());
        assert!(table.matching(&Method::GET, "/v1x0/data").is_none());
    }

    #[test]
    fn native_decimal_price_scales_to_stroops() {
        let rule = RouteRule::new("/a", "1.5").unwrap();
        let reqs = rule
            .requirements(Network::StellarTestnet, PAY_TO, "https://x/a")
            .unwrap();
        assert_eq!(reqs.max_amount_required, "15000000");
        assert_eq!(reqs.asset, NATIVE_ASSET);
        assert_eq!(reqs.max_timeout_seconds, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn whole_number_prices_pass_through() {
        let rule = RouteRule::new("/a", "10000000").unwrap();
        let reqs = rule
            .requirements(Network::StellarTestnet, PAY_TO, "https://x/a")
            .unwrap();
        assert_eq!(reqs.max_amount_required, "10000000");

        let rule = RouteRule::new("/a", 42u64).unwrap();
        let reqs = rule
            .requirements(Network::StellarTestnet, PAY_TO, "https://x/a")
            .unwrap();
        assert_eq!(reqs.max_amount_required, "42");
    }

    #[test]
    fn contract_prices_use_asset_decimals() {
        let rule = RouteRule::new("/a", "0.5").unwrap().with_asset(CONTRACT, 6);
        let reqs = rule
            .requirements(Network::StellarTestnet, PAY_TO, "https://x/a")
            .unwrap();
        assert_eq!(reqs.max_amount_required, "500000");
        assert_eq!(reqs.asset, CONTRACT);
    }

    #[test]
    fn zero_price_is_rejected() {
        let rule = RouteRule::new("/a", 0u64).unwrap();
        assert!(rule
            .requirements(Network::StellarTestnet, PAY_TO, "https://x/a")
            .is_err());
    }
}
