//! Host pattern matching.
//!
//! # Responsibilities
//! - Match a host against a pattern where `*` stands for any run of
//!   characters, including the empty run
//! - Anchor the match on both ends
//!
//! # Design Decisions
//! - Host matching is case-insensitive
//! - `.` in a pattern matches any single character, so `*.*.example.com`
//!   accepts `simple.example.com`
//! - No regex: a single backtracking scan over the pattern

/// Matches a host string against a compiled pattern.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the host matches this pattern.
    fn matches(&self, host: &str) -> bool;
}

/// Pattern with one or more `*` wildcards, e.g. `*.example.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardMatcher {
    pattern: Vec<char>,
}

impl WildcardMatcher {
    /// Compile a pattern. The pattern is normalized to lowercase.
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_ascii_lowercase().chars().collect(),
        }
    }

    /// Returns true if the pattern contains at least one `*`.
    pub fn is_wildcard(pattern: &str) -> bool {
        pattern.contains('*')
    }
}

impl Matcher for WildcardMatcher {
    fn matches(&self, host: &str) -> bool {
        let host: Vec<char> = host.to_ascii_lowercase().chars().collect();
        let pattern = &self.pattern;

        let (mut p, mut h) = (0, 0);
        // Position of the last star seen and the host index it currently covers up to.
        let mut backtrack: Option<(usize, usize)> = None;

        while h < host.len() {
            match pattern.get(p) {
                Some('*') => {
                    backtrack = Some((p, h));
                    p += 1;
                }
                Some(&c) if c == '.' || c == host[h] => {
                    p += 1;
                    h += 1;
                }
                _ => match backtrack {
                    // Let the last star swallow one more character and retry.
                    Some((star, covered)) => {
                        backtrack = Some((star, covered + 1));
                        p = star + 1;
                        h = covered + 1;
                    }
                    None => return false,
                },
            }
        }

        pattern[p..].iter().all(|&c| c == '*')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_wildcard() {
        let matcher = WildcardMatcher::new("*.example.com");
        assert!(matcher.matches("api.example.com"));
        assert!(matcher.matches("a.b.example.com"));
        assert!(matcher.matches(".example.com")); // empty run
        assert!(!matcher.matches("example.com"));
        assert!(!matcher.matches("api.example.org"));
    }

    #[test]
    fn test_dot_matches_single_character() {
        let matcher = WildcardMatcher::new("*.example.com");
        assert!(matcher.matches("api-example.com"));
        assert!(!matcher.matches("apiexamplecom"));
    }

    #[test]
    fn test_case_insensitive() {
        let matcher = WildcardMatcher::new("*.Example.COM");
        assert!(matcher.matches("API.example.com"));
    }

    #[test]
    fn test_multiple_wildcards_with_empty_runs() {
        let matcher = WildcardMatcher::new("*.*.example.com");
        assert!(matcher.matches("a.b.example.com"));
        assert!(matcher.matches("simple.example.com"));
        assert!(!matcher.matches("example.com"));
        assert!(!matcher.matches("simple.example.com.evil"));
    }

    #[test]
    fn test_inner_and_trailing_wildcards() {
        let matcher = WildcardMatcher::new("api-*.internal:*");
        assert!(matcher.matches("api-1.internal:8080"));
        assert!(matcher.matches("api-xinternal:"));
        assert!(!matcher.matches("web-1.internal:8080"));

        let overlapping = WildcardMatcher::new("ab*ba");
        assert!(!overlapping.matches("aba"));
        assert!(overlapping.matches("abba"));
        assert!(overlapping.matches("abxxba"));
    }

    #[test]
    fn test_lone_star_matches_everything() {
        let matcher = WildcardMatcher::new("*");
        assert!(matcher.matches(""));
        assert!(matcher.matches("anything.at:all"));
    }
}
