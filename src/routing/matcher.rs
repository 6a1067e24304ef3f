//! Route predicates.
//!
//! # Responsibilities
//! - Decide whether a route entry accepts a request
//! - Provide method and header conditions
//! - Combine conditions with AND / OR semantics
//!
//! # Design Decisions
//! - Matchers are pure: no state, no side effects
//! - Any `Fn(&Request<Body>) -> bool` closure is a matcher
//! - Header names are case-insensitive, header values are compared exactly
//! - No regex; paths are handled by the route table, not by matchers

use axum::body::Body;
use axum::http::{HeaderName, Method, Request};

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &Request<Body>) -> bool;
}

impl<F> Matcher for F
where
    F: Fn(&Request<Body>) -> bool + Send + Sync,
{
    fn matches(&self, req: &Request<Body>) -> bool {
        self(req)
    }
}

/// Matches one of a set of HTTP methods.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    methods: Vec<Method>,
}

impl MethodMatcher {
    pub fn new(methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            methods: methods.into_iter().collect(),
        }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.methods.contains(req.method())
    }
}

/// Matches on a request header, either its presence or an exact value.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    name: HeaderName,
    value: Option<String>,
}

impl HeaderMatcher {
    /// Header must be present, any value.
    pub fn present(name: HeaderName) -> Self {
        Self { name, value: None }
    }

    /// Header must be present with exactly this value.
    pub fn equals(name: HeaderName, value: impl Into<String>) -> Self {
        Self {
            name,
            value: Some(value.into()),
        }
    }
}

impl Matcher for HeaderMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        let mut values = req.headers().get_all(&self.name).iter();
        match &self.value {
            None => values.next().is_some(),
            Some(expected) => values.any(|v| v.as_bytes() == expected.as_bytes()),
        }
    }
}

/// Combines multiple matchers with AND semantics.
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.matchers.iter().all(|m| m.matches(req))
    }
}

/// Combines multiple matchers with OR semantics. Empty never matches.
pub struct AnyMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AnyMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AnyMatcher {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.matchers.iter().any(|m| m.matches(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    fn request(method: Method) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri("/api/v1")
            .header("X-Tenant", "blue")
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_method_matcher() {
        let matcher = MethodMatcher::new([Method::GET, Method::HEAD]);
        assert!(matcher.matches(&request(Method::GET)));
        assert!(matcher.matches(&request(Method::HEAD)));
        assert!(!matcher.matches(&request(Method::POST)));
    }

    #[test]
    fn test_header_matcher() {
        let tenant = HeaderName::from_static("x-tenant");
        assert!(HeaderMatcher::present(tenant.clone()).matches(&request(Method::GET)));
        assert!(HeaderMatcher::equals(tenant.clone(), "blue").matches(&request(Method::GET)));
        assert!(!HeaderMatcher::equals(tenant, "green").matches(&request(Method::GET)));
        assert!(!HeaderMatcher::present(header::AUTHORIZATION).matches(&request(Method::GET)));
    }

    #[test]
    fn test_combinators() {
        let get_blue = AndMatcher::new(vec![
            Box::new(MethodMatcher::new([Method::GET])),
            Box::new(HeaderMatcher::equals(HeaderName::from_static("x-tenant"), "blue")),
        ]);
        assert!(get_blue.matches(&request(Method::GET)));
        assert!(!get_blue.matches(&request(Method::PUT)));

        let put_or_closure = AnyMatcher::new(vec![
            Box::new(MethodMatcher::new([Method::PUT])),
            Box::new(|req: &Request<Body>| req.uri().path().ends_with("/v1")),
        ]);
        assert!(put_or_closure.matches(&request(Method::DELETE)));
        assert!(!AnyMatcher::new(Vec::new()).matches(&request(Method::GET)));
    }
}
