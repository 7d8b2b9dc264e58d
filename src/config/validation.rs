//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (groups reference backends, rules reference groups)
//! - Validate value ranges (timeouts > 0, capacities > 0, quorum fits the group)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use thiserror::Error;
use url::Url;

use crate::backend::Consistency;
use crate::config::schema::RelayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no backends configured")]
    NoBackends,

    #[error("no backend groups configured")]
    NoGroups,

    #[error("duplicate backend name '{0}'")]
    DuplicateBackend(String),

    #[error("duplicate group name '{0}'")]
    DuplicateGroup(String),

    /// Not an `http://host[:port]` URL. Backends are reached over plain HTTP.
    #[error("backend '{name}' has invalid address '{address}' (expected http://host[:port])")]
    InvalidAddress { name: String, address: String },

    #[error("group '{0}' has no members")]
    EmptyGroup(String),

    #[error("group '{group}' references unknown backend '{backend}'")]
    UnknownMember { group: String, backend: String },

    #[error("group '{group}' requires quorum of {quorum} but has {members} member(s)")]
    QuorumTooLarge {
        group: String,
        quorum: usize,
        members: usize,
    },

    #[error("group '{0}' has max_in_flight = 0")]
    ZeroInFlight(String),

    #[error("rule '{0}' targets no groups")]
    RuleWithoutGroups(String),

    #[error("rule '{rule}' references unknown group '{group}'")]
    UnknownGroup { rule: String, group: String },

    #[error("'{0}' must be greater than zero")]
    Zero(&'static str),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }
    if config.groups.is_empty() {
        errors.push(ValidationError::NoGroups);
    }

    let mut backend_names = HashSet::new();
    for backend in &config.backends {
        if !backend_names.insert(backend.name.as_str()) {
            errors.push(ValidationError::DuplicateBackend(backend.name.clone()));
        }
        let valid = Url::parse(&backend.address)
            .map(|u| u.scheme() == "http" && u.host().is_some())
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::InvalidAddress {
                name: backend.name.clone(),
                address: backend.address.clone(),
            });
        }
    }

    let mut group_names = HashSet::new();
    for group in &config.groups {
        if !group_names.insert(group.name.as_str()) {
            errors.push(ValidationError::DuplicateGroup(group.name.clone()));
        }
        if group.members.is_empty() {
            errors.push(ValidationError::EmptyGroup(group.name.clone()));
        }
        for member in &group.members {
            if !backend_names.contains(member.as_str()) {
                errors.push(ValidationError::UnknownMember {
                    group: group.name.clone(),
                    backend: member.clone(),
                });
            }
        }
        if let Consistency::Quorum(n) = group.consistency {
            if n > group.members.len() {
                errors.push(ValidationError::QuorumTooLarge {
                    group: group.name.clone(),
                    quorum: n,
                    members: group.members.len(),
                });
            }
        }
        if group.max_in_flight == 0 {
            errors.push(ValidationError::ZeroInFlight(group.name.clone()));
        }
    }

    for rule in &config.rules {
        if rule.groups.is_empty() {
            errors.push(ValidationError::RuleWithoutGroups(rule.name.clone()));
        }
        for group in &rule.groups {
            if !group_names.contains(group.as_str()) {
                errors.push(ValidationError::UnknownGroup {
                    rule: rule.name.clone(),
                    group: group.clone(),
                });
            }
        }
    }

    let ranges: [(&'static str, u64); 10] = [
        ("timeouts.send_ms", config.timeouts.send_ms),
        ("timeouts.write_deadline_ms", config.timeouts.write_deadline_ms),
        ("timeouts.probe_ms", config.timeouts.probe_ms),
        ("health.probe_interval_secs", config.health.probe_interval_secs),
        ("health.degraded_after", config.health.degraded_after as u64),
        ("health.down_after", config.health.down_after as u64),
        ("retry_buffer.max_entries_per_backend", config.retry_buffer.max_entries_per_backend as u64),
        ("retry_buffer.max_total_entries", config.retry_buffer.max_total_entries as u64),
        ("retry_buffer.max_attempts", config.retry_buffer.max_attempts as u64),
        ("retry_buffer.drain_interval_secs", config.retry_buffer.drain_interval_secs),
    ];
    for (field, value) in ranges {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BackendConfig, GroupConfig, RuleConfig};

    fn valid() -> RelayConfig {
        let mut config = RelayConfig::default();
        config.backends.push(BackendConfig::new("a", "http://127.0.0.1:8086"));
        config.backends.push(BackendConfig::new("b", "http://127.0.0.1:8087"));
        config
            .groups
            .push(GroupConfig::new("primary", &["a", "b"], Consistency::All));
        config.rules.push(RuleConfig {
            name: "default".into(),
            groups: vec!["primary".into()],
            ..Default::default()
        });
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid();
        config.backends.push(BackendConfig::new("a", "not a url"));
        config.groups[0].members.push("ghost".into());
        config.groups[0].consistency = Consistency::Quorum(5);
        config.rules[0].groups.push("missing".into());
        config.retry_buffer.max_attempts = 0;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateBackend("a".into())));
        assert!(errors.contains(&ValidationError::InvalidAddress {
            name: "a".into(),
            address: "not a url".into(),
        }));
        assert!(errors.contains(&ValidationError::UnknownMember {
            group: "primary".into(),
            backend: "ghost".into(),
        }));
        assert!(errors.contains(&ValidationError::QuorumTooLarge {
            group: "primary".into(),
            quorum: 5,
            members: 3,
        }));
        assert!(errors.contains(&ValidationError::UnknownGroup {
            rule: "default".into(),
            group: "missing".into(),
        }));
        assert!(errors.contains(&ValidationError::Zero("retry_buffer.max_attempts")));
    }

    #[test]
    fn test_only_plain_http_addresses() {
        let mut config = valid();
        config.backends[0].address = "https://127.0.0.1:8086".into();
        config.backends[1].address = "udp://127.0.0.1:8089".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidAddress {
                    name: "a".into(),
                    address: "https://127.0.0.1:8086".into(),
                },
                ValidationError::InvalidAddress {
                    name: "b".into(),
                    address: "udp://127.0.0.1:8089".into(),
                },
            ]
        );
    }

    #[test]
    fn test_no_backends_is_fatal() {
        let errors = validate_config(&RelayConfig::default()).unwrap_err();
        assert!(errors.contains(&ValidationError::NoBackends));
        assert!(errors.contains(&ValidationError::NoGroups));
    }
}
