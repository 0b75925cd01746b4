//! Which requests may skip authentication and role checks.
//!
//! A request bypasses both the authentication and staff stages when:
//!
//! - its method is safe (`GET` or `OPTIONS`), or
//! - its path falls under a configured public route prefix
//!
//! # Path Matching Behavior
//!
//! Prefixes match on whole path segments: `/api/v1/login` matches
//! `/api/v1/login` and `/api/v1/login/refresh`, but not `/api/v1/loginx`
//! or `/api/v1/users/login`. Matching is case-sensitive and ignores the
//! query string.

use std::sync::Arc;

use axum::http::Method;

/// Methods that never require a token.
pub const SAFE_METHODS: [Method; 2] = [Method::GET, Method::OPTIONS];

/// Shared bypass policy for the authentication and staff stages.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    public_prefixes: Arc<[String]>,
}

impl AccessPolicy {
    /// Build a policy from route prefixes reachable without a token.
    ///
    /// A trailing `/` on a prefix is ignored.
    pub fn new<I, P>(public_prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let public_prefixes = public_prefixes
            .into_iter()
            .map(Into::into)
            .map(|p| match p.trim_end_matches('/') {
                "" => "/".to_string(),
                trimmed => trimmed.to_string(),
            })
            .collect();

        Self { public_prefixes }
    }

    /// `true` for `GET` and `OPTIONS`.
    pub fn is_safe_method(method: &Method) -> bool {
        SAFE_METHODS.contains(method)
    }

    /// `true` if `path` is under one of the public prefixes.
    pub fn is_public_route(&self, path: &str) -> bool {
        self.public_prefixes.iter().any(|prefix| {
            prefix == "/"
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    /// `true` if the request skips authentication entirely.
    pub fn bypasses(&self, method: &Method, path: &str) -> bool {
        Self::is_safe_method(method) || self.is_public_route(path)
    }

    pub fn public_prefixes(&self) -> &[String] {
        &self.public_prefixes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_AUTH_BYPASS_PATHS;

    fn policy() -> AccessPolicy {
        AccessPolicy::new(DEFAULT_AUTH_BYPASS_PATHS)
    }

    #[test]
    fn test_safe_methods() {
        assert!(AccessPolicy::is_safe_method(&Method::GET));
        assert!(AccessPolicy::is_safe_method(&Method::OPTIONS));
        assert!(!AccessPolicy::is_safe_method(&Method::HEAD));
        assert!(!AccessPolicy::is_safe_method(&Method::POST));
        assert!(!AccessPolicy::is_safe_method(&Method::DELETE));
    }

    #[test]
    fn test_public_prefix_matches_segments() {
        let policy = policy();

        assert!(policy.is_public_route("/api/v1/login"));
        assert!(policy.is_public_route("/api/v1/signup"));
        assert!(policy.is_public_route("/api/v1/cafes/nearest"));
        assert!(policy.is_public_route("/api/v1/cafes/nearest/42"));
    }

    #[test]
    fn test_substring_is_not_enough() {
        let policy = policy();

        assert!(!policy.is_public_route("/api/v1/loginx"));
        assert!(!policy.is_public_route("/api/v1/users/login"));
        assert!(!policy.is_public_route("/api/v1/cafes"));
        assert!(!policy.is_public_route("/API/V1/LOGIN"));
    }

    #[test]
    fn test_bypasses_combines_method_and_path() {
        let policy = policy();

        assert!(policy.bypasses(&Method::GET, "/api/v1/cafes"));
        assert!(policy.bypasses(&Method::POST, "/api/v1/login"));
        assert!(!policy.bypasses(&Method::POST, "/api/v1/cafes"));
        assert!(!policy.bypasses(&Method::PUT, "/api/v1/cafes/3"));
    }

    #[test]
    fn test_trailing_slash_prefix_normalized() {
        let policy = AccessPolicy::new(["/public/"]);
        assert!(policy.is_public_route("/public"));
        assert!(policy.is_public_route("/public/page"));
        assert_eq!(policy.public_prefixes(), ["/public".to_string()]);
    }

    #[test]
    fn test_empty_policy() {
        let policy = AccessPolicy::new(Vec::<String>::new());
        assert!(!policy.is_public_route("/api/v1/login"));
        assert!(policy.bypasses(&Method::OPTIONS, "/anything"));
    }
}
