//! Rule matching logic.
//!
//! # Responsibilities
//! - Match a write attribute (database, tenant, measurement) against a pattern
//! - Combine conditions with AND semantics
//! - Report how specific a rule is so the most specific one wins
//!
//! # Design Decisions
//! - Patterns are exact values, `prefix*` globs, or `*`
//! - Matching is case-sensitive (backends treat names that way)
//! - An attribute the write does not carry never matches a pattern
//! - No regex to guarantee O(n) matching

use crate::write::Destination;

/// How specific a matcher is. Larger sorts first.
///
/// Exact conditions beat prefix conditions, and longer prefixes beat
/// shorter ones. Wildcards contribute nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    pub exact: usize,
    pub prefixed: usize,
    pub prefix_len: usize,
}

impl std::ops::Add for Specificity {
    type Output = Specificity;

    fn add(self, other: Specificity) -> Specificity {
        Specificity {
            exact: self.exact + other.exact,
            prefixed: self.prefixed + other.prefixed,
            prefix_len: self.prefix_len + other.prefix_len,
        }
    }
}

/// Trait for matching writes against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the write matches this condition.
    fn matches(&self, destination: &Destination) -> bool;

    fn specificity(&self) -> Specificity;
}

/// A compiled attribute pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Any,
    Exact(String),
    Prefix(String),
}

impl Pattern {
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            Pattern::Any
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            Pattern::Prefix(prefix.to_string())
        } else {
            Pattern::Exact(pattern.to_string())
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Exact(expected) => value == expected,
            Pattern::Prefix(prefix) => value.starts_with(prefix.as_str()),
        }
    }

    fn specificity(&self) -> Specificity {
        match self {
            Pattern::Any => Specificity::default(),
            Pattern::Exact(_) => Specificity {
                exact: 1,
                ..Specificity::default()
            },
            Pattern::Prefix(prefix) => Specificity {
                prefixed: 1,
                prefix_len: prefix.len(),
                ..Specificity::default()
            },
        }
    }
}

/// Routing attribute of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Database,
    Tenant,
    Measurement,
}

impl Attribute {
    fn value<'a>(&self, destination: &'a Destination) -> Option<&'a str> {
        match self {
            Attribute::Database => Some(destination.database.as_str()),
            Attribute::Tenant => destination.tenant.as_deref(),
            Attribute::Measurement => destination.measurement.as_deref(),
        }
    }
}

/// Matches one attribute against a pattern.
#[derive(Debug, Clone)]
pub struct AttributeMatcher {
    attribute: Attribute,
    pattern: Pattern,
}

impl AttributeMatcher {
    pub fn new(attribute: Attribute, pattern: &str) -> Self {
        Self {
            attribute,
            pattern: Pattern::parse(pattern),
        }
    }
}

impl Matcher for AttributeMatcher {
    fn matches(&self, destination: &Destination) -> bool {
        self.attribute
            .value(destination)
            .map(|value| self.pattern.matches(value))
            .unwrap_or(false)
    }

    fn specificity(&self) -> Specificity {
        self.pattern.specificity()
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, destination: &Destination) -> bool {
        // All matchers must pass (AND); no matchers matches everything
        self.matchers.iter().all(|m| m.matches(destination))
    }

    fn specificity(&self) -> Specificity {
        self.matchers
            .iter()
            .map(|m| m.specificity())
            .fold(Specificity::default(), |acc, s| acc + s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_matcher() {
        let matcher = AttributeMatcher::new(Attribute::Database, "telegraf");
        assert!(matcher.matches(&Destination::new("telegraf")));
        assert!(!matcher.matches(&Destination::new("Telegraf")));
        assert!(!matcher.matches(&Destination::new("telegraf2")));
    }

    #[test]
    fn test_prefix_and_wildcard() {
        let prefix = AttributeMatcher::new(Attribute::Measurement, "cpu_*");
        assert!(prefix.matches(&Destination::new("db").with_measurement("cpu_load")));
        assert!(!prefix.matches(&Destination::new("db").with_measurement("mem")));

        let any = AttributeMatcher::new(Attribute::Tenant, "*");
        assert!(any.matches(&Destination::new("db").with_tenant("acme")));
        // Wildcard still requires the attribute to be present.
        assert!(!any.matches(&Destination::new("db")));
    }

    #[test]
    fn test_and_matcher() {
        let matcher = AndMatcher::new(vec![
            Box::new(AttributeMatcher::new(Attribute::Database, "metrics")),
            Box::new(AttributeMatcher::new(Attribute::Tenant, "acme")),
        ]);
        assert!(matcher.matches(&Destination::new("metrics").with_tenant("acme")));
        assert!(!matcher.matches(&Destination::new("metrics").with_tenant("globex")));
        assert!(!matcher.matches(&Destination::new("metrics")));
        assert!(AndMatcher::new(Vec::new()).matches(&Destination::new("anything")));
    }

    #[test]
    fn test_specificity_ordering() {
        let exact = AttributeMatcher::new(Attribute::Database, "metrics").specificity();
        let long = AttributeMatcher::new(Attribute::Database, "metrics_*").specificity();
        let short = AttributeMatcher::new(Attribute::Database, "m*").specificity();
        let any = AttributeMatcher::new(Attribute::Database, "*").specificity();

        assert!(exact > long);
        assert!(long > short);
        assert!(short > any);
    }
}
