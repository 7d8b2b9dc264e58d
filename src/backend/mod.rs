//! Backend subsystem.
//!
//! # Data Flow
//! ```text
//! RelayConfig (backends, groups, rules)
//!     → topology.rs (build immutable snapshot)
//!         → node.rs (Backend: identity + client + shared health cell)
//!         → group.rs (BackendGroup: members + consistency + send limiter)
//!         → consistency.rs (all / any / quorum-N)
//!     → client.rs (single-attempt send + liveness probe)
//! ```
//!
//! # Design Decisions
//! - Groups reference backends; a backend may belong to several groups
//! - Clients never retry; classification is their only policy
//! - Health is read here but only written by the health tracker

pub mod client;
pub mod consistency;
pub mod group;
pub mod node;
pub mod topology;

pub use client::{BackendClient, ClientFactory, HttpBackendClient, HttpClientFactory};
pub use consistency::Consistency;
pub use group::BackendGroup;
pub use node::Backend;
pub use topology::Topology;
