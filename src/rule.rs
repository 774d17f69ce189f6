//! Match rules deciding whether an incoming request corresponds to a recorded one

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::message::Request;
use crate::{Result, TapedeckError};

/// A single comparison dimension between two requests
///
/// Every rule is a pure, symmetric predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MatchRule {
    /// Methods are identical
    Method,
    /// Full URIs are identical
    Uri,
    /// Hosts are equal, ignoring case
    Host,
    /// Paths are identical
    Path,
    /// Query parameters are the same multiset after percent-decoding
    Query,
    /// `Authorization` headers are identical (or both absent)
    Authorization,
    /// `Accept` headers are identical (or both absent)
    Accept,
    /// Header sets are equal: names ignore case, order is irrelevant
    Headers,
    /// Bodies are byte-identical
    Body,
}

impl MatchRule {
    /// All rules, in declaration order
    pub const ALL: [Self; 9] = [
        Self::Method,
        Self::Uri,
        Self::Host,
        Self::Path,
        Self::Query,
        Self::Authorization,
        Self::Accept,
        Self::Headers,
        Self::Body,
    ];

    /// Compare two requests along this rule's dimension
    #[must_use]
    pub fn matches(self, a: &Request, b: &Request) -> bool {
        match self {
            Self::Method => a.method == b.method,
            Self::Uri => a.uri == b.uri,
            Self::Host => a.host() == b.host(),
            Self::Path => a.path() == b.path(),
            Self::Query => query_pairs(a) == query_pairs(b),
            Self::Authorization => a.header("authorization") == b.header("authorization"),
            Self::Accept => a.header("accept") == b.header("accept"),
            Self::Headers => normalized_headers(a) == normalized_headers(b),
            Self::Body => a.body == b.body,
        }
    }

    /// Lower-case rule name as used in configuration
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Method => "method",
            Self::Uri => "uri",
            Self::Host => "host",
            Self::Path => "path",
            Self::Query => "query",
            Self::Authorization => "authorization",
            Self::Accept => "accept",
            Self::Headers => "headers",
            Self::Body => "body",
        }
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchRule {
    type Err = TapedeckError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|rule| rule.as_str() == normalized)
            .ok_or_else(|| TapedeckError::Config(format!("Unknown match rule '{s}'")))
    }
}

impl TryFrom<String> for MatchRule {
    type Error = TapedeckError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MatchRule> for String {
    fn from(rule: MatchRule) -> Self {
        rule.as_str().to_string()
    }
}

/// Ordered, non-empty conjunction of match rules
///
/// Rules are evaluated in declaration order and short-circuit on the first
/// mismatch. Order only affects which rule is reported, never the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMatchRule {
    rules: Vec<MatchRule>,
}

impl ComposedMatchRule {
    /// Compose rules into a single decision rule
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `rules` is empty
    pub fn new(rules: impl IntoIterator<Item = MatchRule>) -> Result<Self> {
        let rules: Vec<_> = rules.into_iter().collect();
        if rules.is_empty() {
            return Err(TapedeckError::Config(
                "At least one match rule must be configured".to_string(),
            ));
        }
        Ok(Self { rules })
    }

    /// Parse a comma-separated rule list such as `"method,uri,body"`
    ///
    /// # Errors
    ///
    /// Returns a configuration error on unknown names or an empty list
    pub fn parse_list(list: &str) -> Result<Self> {
        let rules = list
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<MatchRule>>>()?;
        Self::new(rules)
    }

    /// Member rules in evaluation order
    #[must_use]
    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }

    /// First rule that rejects the pair, if any
    #[must_use]
    pub fn first_mismatch(&self, a: &Request, b: &Request) -> Option<MatchRule> {
        self.rules.iter().copied().find(|rule| !rule.matches(a, b))
    }

    /// True iff every member rule matches
    #[must_use]
    pub fn matches(&self, a: &Request, b: &Request) -> bool {
        self.first_mismatch(a, b).is_none()
    }
}

impl Default for ComposedMatchRule {
    fn default() -> Self {
        Self {
            rules: vec![MatchRule::Method, MatchRule::Uri],
        }
    }
}

impl fmt::Display for ComposedMatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.rules.iter().map(|rule| rule.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

fn query_pairs(request: &Request) -> Vec<(String, String)> {
    let mut pairs: Vec<_> = request
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect();
    pairs.sort();
    pairs
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

fn normalized_headers(request: &Request) -> Vec<(String, String)> {
    let mut headers: Vec<_> = request
        .headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    headers.sort();
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn get(uri: &str) -> Request {
        Request::new("GET", uri)
    }

    #[test]
    fn test_method_and_uri() {
        let a = get("http://example.com/");
        let b = Request::new("POST", "http://example.com/");

        assert!(MatchRule::Uri.matches(&a, &b));
        assert!(!MatchRule::Method.matches(&a, &b));
    }

    #[test]
    fn test_host_ignores_case_and_path() {
        let a = get("http://Example.com/a");
        let b = get("http://example.COM/b");

        assert!(MatchRule::Host.matches(&a, &b));
        assert!(!MatchRule::Path.matches(&a, &b));
    }

    #[test]
    fn test_query_order_and_encoding() {
        let a = get("http://example.com/search?q=rust%20lang&page=2");
        let b = get("http://example.com/search?page=2&q=rust+lang");
        let c = get("http://example.com/search?page=3&q=rust+lang");

        assert!(MatchRule::Query.matches(&a, &b));
        assert!(!MatchRule::Query.matches(&a, &c));
        assert!(!MatchRule::Uri.matches(&a, &b));
    }

    #[test]
    fn test_header_rules() {
        let a = get("http://example.com/")
            .with_header("Accept", "application/json")
            .with_header("Authorization", "Bearer abc");
        let b = get("http://example.com/")
            .with_header("authorization", "Bearer abc")
            .with_header("accept", " application/json ");
        let c = get("http://example.com/").with_header("Accept", "text/html");

        assert!(MatchRule::Headers.matches(&a, &b));
        assert!(MatchRule::Authorization.matches(&a, &b));
        assert!(!MatchRule::Accept.matches(&a, &c));
        assert!(!MatchRule::Authorization.matches(&a, &c));
    }

    #[test]
    fn test_body() {
        let a = get("http://example.com/").with_body("one");
        let b = get("http://example.com/").with_body("two");

        assert!(!MatchRule::Body.matches(&a, &b));
        assert!(MatchRule::Body.matches(&a, &a.clone()));
    }

    #[test]
    fn test_parse_rule_names() {
        assert_eq!("METHOD".parse::<MatchRule>().unwrap(), MatchRule::Method);
        assert!("cookie".parse::<MatchRule>().is_err());
    }

    #[test]
    fn test_empty_composition_rejected() {
        assert!(ComposedMatchRule::new(Vec::new()).is_err());
        assert!(ComposedMatchRule::parse_list(" , ").is_err());
    }

    #[test]
    fn test_default_is_method_and_uri() {
        let rules = ComposedMatchRule::default();
        assert_eq!(rules.rules(), &[MatchRule::Method, MatchRule::Uri]);
        assert_eq!(rules.to_string(), "[method, uri]");
    }

    #[test]
    fn test_first_mismatch_follows_declaration_order() {
        let a = get("http://example.com/a");
        let b = Request::new("POST", "http://example.com/b");

        let method_first = ComposedMatchRule::parse_list("method,uri").unwrap();
        let uri_first = ComposedMatchRule::parse_list("uri,method").unwrap();

        assert_eq!(method_first.first_mismatch(&a, &b), Some(MatchRule::Method));
        assert_eq!(uri_first.first_mismatch(&a, &b), Some(MatchRule::Uri));
        assert!(!method_first.matches(&a, &b));
        assert!(!uri_first.matches(&a, &b));
    }

    fn arb_request() -> impl Strategy<Value = Request> {
        (
            prop::sample::select(vec!["GET", "POST", "PUT"]),
            prop::sample::select(vec!["/", "/a", "/a?x=1", "/b?x=1&y=2"]),
            prop::sample::select(vec!["", "x", "payload"]),
        )
            .prop_map(|(method, path, body)| {
                Request::new(method, format!("http://example.com{path}")).with_body(body)
            })
    }

    proptest! {
        #[test]
        fn prop_order_never_changes_outcome(
            a in arb_request(),
            b in arb_request(),
            rules in prop::sample::subsequence(MatchRule::ALL.to_vec(), 1..=MatchRule::ALL.len()),
        ) {
            let forward = ComposedMatchRule::new(rules.clone()).unwrap();
            let reversed = ComposedMatchRule::new(rules.into_iter().rev()).unwrap();

            prop_assert_eq!(forward.matches(&a, &b), reversed.matches(&a, &b));
        }

        #[test]
        fn prop_rules_are_symmetric(a in arb_request(), b in arb_request()) {
            for rule in MatchRule::ALL {
                prop_assert_eq!(rule.matches(&a, &b), rule.matches(&b, &a));
            }
        }
    }
}
