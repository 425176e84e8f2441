//! Route lookup by host.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the route for a host (with or without port)
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Precedence: exact key > key with port stripped > first declared wildcard
//! - Wildcard ties resolve by declaration order, never by specificity

use crate::config::schema::RouteConfig;
use crate::routing::matcher::{Matcher, WildcardMatcher};

/// A compiled route: its pattern, an optional wildcard matcher and the route itself.
#[derive(Debug)]
struct CompiledRoute {
    pattern: String,
    wildcard: Option<WildcardMatcher>,
    route: RouteConfig,
}

/// Host-keyed route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Compile routes, keeping declaration order.
    pub fn new(routes: Vec<(String, RouteConfig)>) -> Self {
        let routes = routes
            .into_iter()
            .map(|(pattern, route)| CompiledRoute {
                wildcard: WildcardMatcher::is_wildcard(&pattern).then(|| WildcardMatcher::new(&pattern)),
                pattern,
                route,
            })
            .collect();
        Self { routes }
    }

    /// Find the route for a host.
    pub fn lookup(&self, host: &str) -> Option<&RouteConfig> {
        if let Some(route) = self.exact(host) {
            return Some(route);
        }

        let bare = strip_port(host);
        if let Some(route) = self.exact(bare) {
            return Some(route);
        }

        self.routes
            .iter()
            .filter_map(|r| r.wildcard.as_ref().map(|m| (m, &r.route)))
            .find(|(matcher, _)| matcher.matches(host) || matcher.matches(bare))
            .map(|(_, route)| route)
    }

    fn exact(&self, host: &str) -> Option<&RouteConfig> {
        self.routes
            .iter()
            .find(|r| r.pattern.eq_ignore_ascii_case(host))
            .map(|r| &r.route)
    }

    /// Declared host patterns, in order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|r| r.pattern.as_str())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Drop a trailing `:port` from a host. Bracketed IPv6 literals keep their brackets.
pub fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    host.split(':').next().unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(patterns: &[(&str, &str)]) -> RouteTable {
        RouteTable::new(
            patterns
                .iter()
                .map(|(p, t)| (p.to_string(), RouteConfig::new(*t)))
                .collect(),
        )
    }

    fn target<'a>(table: &'a RouteTable, host: &str) -> Option<&'a str> {
        table.lookup(host).map(|r| r.target.as_str())
    }

    #[test]
    fn test_exact_with_any_port() {
        let routes = table(&[("api.example.com", "127.0.0.1:1")]);
        assert_eq!(target(&routes, "api.example.com"), Some("127.0.0.1:1"));
        assert_eq!(target(&routes, "api.example.com:443"), Some("127.0.0.1:1"));
        assert_eq!(target(&routes, "api.example.com:8080"), Some("127.0.0.1:1"));
        assert_eq!(target(&routes, "other.example.com"), None);
    }

    #[test]
    fn test_key_with_port_beats_bare_key() {
        let routes = table(&[
            ("site.test", "127.0.0.1:1"),
            ("site.test:8443", "127.0.0.1:2"),
        ]);
        assert_eq!(target(&routes, "site.test:8443"), Some("127.0.0.1:2"));
        assert_eq!(target(&routes, "site.test:9000"), Some("127.0.0.1:1"));
    }

    #[test]
    fn test_exact_beats_wildcard_regardless_of_order() {
        let routes = table(&[
            ("*.example.com", "127.0.0.1:1"),
            ("api.example.com", "127.0.0.1:2"),
        ]);
        assert_eq!(target(&routes, "api.example.com"), Some("127.0.0.1:2"));
        assert_eq!(target(&routes, "web.example.com:80"), Some("127.0.0.1:1"));
    }

    #[test]
    fn test_first_declared_wildcard_wins() {
        let routes = table(&[
            ("*.*.example.com", "127.0.0.1:1"),
            ("*.example.com", "127.0.0.1:2"),
        ]);
        assert_eq!(target(&routes, "simple.example.com"), Some("127.0.0.1:1"));

        let reversed = table(&[
            ("*.example.com", "127.0.0.1:2"),
            ("*.*.example.com", "127.0.0.1:1"),
        ]);
        assert_eq!(target(&reversed, "simple.example.com"), Some("127.0.0.1:2"));
    }

    #[test]
    fn test_wildcard_matches_full_host_with_port() {
        let routes = table(&[("*.local:9000", "127.0.0.1:1")]);
        assert_eq!(target(&routes, "app.local:9000"), Some("127.0.0.1:1"));
        assert_eq!(target(&routes, "app.local:9001"), None);
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
    }
}
