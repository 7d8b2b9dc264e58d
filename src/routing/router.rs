//! Rule lookup.
//!
//! # Responsibilities
//! - Store compiled rules
//! - Resolve a write to the groups of the most specific matching rule
//! - Return the groups or an explicit no-route error
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan over rules sorted by specificity (acceptable for typical rule counts)
//! - Ties keep declaration order (stable sort)
//! - Explicit NoRoute rather than a silent default group

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::BackendGroup;
use crate::config::RuleConfig;
use crate::error::RelayError;
use crate::routing::matcher::{AndMatcher, Attribute, AttributeMatcher, Matcher, Specificity};
use crate::write::Destination;

/// A compiled routing rule.
#[derive(Debug)]
struct Rule {
    name: String,
    matcher: AndMatcher,
    specificity: Specificity,
    groups: Vec<Arc<BackendGroup>>,
}

/// A group selected for a write, with the acceptances it needs now.
#[derive(Debug, Clone)]
pub struct ResolvedGroup {
    /// Name of the rule that selected the group.
    pub rule: String,
    pub group: Arc<BackendGroup>,
    pub required: usize,
}

#[derive(Debug, Default)]
pub struct Router {
    rules: Vec<Rule>,
}

impl Router {
    /// Compile rules against the topology's groups.
    ///
    /// Unknown group names are skipped; validation rejects them before this runs.
    pub fn from_config(rules: &[RuleConfig], groups: &HashMap<String, Arc<BackendGroup>>) -> Self {
        let mut compiled: Vec<Rule> = rules
            .iter()
            .map(|rule| {
                let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
                let attributes = [
                    (Attribute::Database, &rule.database),
                    (Attribute::Tenant, &rule.tenant),
                    (Attribute::Measurement, &rule.measurement),
                ];
                for (attribute, pattern) in attributes {
                    if let Some(pattern) = pattern {
                        matchers.push(Box::new(AttributeMatcher::new(attribute, pattern)));
                    }
                }
                let matcher = AndMatcher::new(matchers);

                let mut targets: Vec<Arc<BackendGroup>> = Vec::new();
                for name in &rule.groups {
                    match groups.get(name) {
                        Some(group) if !targets.iter().any(|g| g.name == group.name) => {
                            targets.push(group.clone())
                        }
                        Some(_) => {}
                        None => {
                            tracing::warn!(rule = %rule.name, group = %name, "Rule references unknown group");
                        }
                    }
                }

                Rule {
                    name: rule.name.clone(),
                    specificity: matcher.specificity(),
                    matcher,
                    groups: targets,
                }
            })
            .collect();

        // Most specific first; stable so declaration order breaks ties.
        compiled.sort_by(|a, b| b.specificity.cmp(&a.specificity));

        Self { rules: compiled }
    }

    /// Groups that must receive a write for `destination`.
    pub fn resolve(&self, destination: &Destination) -> Result<Vec<ResolvedGroup>, RelayError> {
        let rule = self
            .rules
            .iter()
            .find(|rule| !rule.groups.is_empty() && rule.matcher.matches(destination))
            .ok_or_else(|| RelayError::NoRoute {
                database: destination.database.clone(),
                tenant: destination.tenant.clone(),
                measurement: destination.measurement.clone(),
            })?;

        tracing::trace!(rule = %rule.name, database = %destination.database, "Route matched");

        Ok(rule
            .groups
            .iter()
            .map(|group| ResolvedGroup {
                rule: rule.name.clone(),
                group: group.clone(),
                required: group.required_acks(),
            })
            .collect())
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Consistency;

    fn groups(names: &[&str]) -> HashMap<String, Arc<BackendGroup>> {
        names
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    Arc::new(BackendGroup::new(*name, Vec::new(), Consistency::All, 1)),
                )
            })
            .collect()
    }

    fn rule(name: &str, database: Option<&str>, tenant: Option<&str>, groups: &[&str]) -> RuleConfig {
        RuleConfig {
            name: name.to_string(),
            database: database.map(String::from),
            tenant: tenant.map(String::from),
            measurement: None,
            groups: groups.iter().map(|g| g.to_string()).collect(),
        }
    }

    fn resolved_names(router: &Router, destination: &Destination) -> Vec<String> {
        router
            .resolve(destination)
            .unwrap()
            .into_iter()
            .map(|r| r.group.name.clone())
            .collect()
    }

    #[test]
    fn test_most_specific_rule_wins() {
        let router = Router::from_config(
            &[
                rule("catch-all", Some("*"), None, &["default"]),
                rule("metrics", Some("metrics_*"), None, &["metrics"]),
                rule("acme", Some("metrics_*"), Some("acme"), &["dedicated"]),
            ],
            &groups(&["default", "metrics", "dedicated"]),
        );

        let acme = Destination::new("metrics_prod").with_tenant("acme");
        assert_eq!(resolved_names(&router, &acme), vec!["dedicated"]);

        let other = Destination::new("metrics_prod").with_tenant("globex");
        assert_eq!(resolved_names(&router, &other), vec!["metrics"]);

        assert_eq!(resolved_names(&router, &Destination::new("logs")), vec!["default"]);
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let router = Router::from_config(
            &[
                rule("first", Some("db"), None, &["a"]),
                rule("second", Some("db"), None, &["b"]),
            ],
            &groups(&["a", "b"]),
        );
        let resolved = router.resolve(&Destination::new("db")).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].rule, "first");
    }

    #[test]
    fn test_fan_out_to_several_groups() {
        let router = Router::from_config(
            &[rule("both", Some("db"), None, &["primary", "analytics", "primary"])],
            &groups(&["primary", "analytics"]),
        );
        assert_eq!(
            resolved_names(&router, &Destination::new("db")),
            vec!["primary", "analytics"]
        );
    }

    #[test]
    fn test_no_route() {
        let router = Router::from_config(
            &[rule("only", Some("metrics"), Some("acme"), &["a"])],
            &groups(&["a"]),
        );
        let err = router.resolve(&Destination::new("metrics")).unwrap_err();
        assert_eq!(
            err,
            RelayError::NoRoute {
                database: "metrics".into(),
                tenant: None,
                measurement: None,
            }
        );
    }
}
