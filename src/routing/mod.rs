//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming write (database, tenant, measurement)
//!     → router.rs (rule lookup)
//!     → matcher.rs (evaluate attribute patterns)
//!     → Return: resolved groups or NoRoute
//!
//! Rule Compilation (per topology):
//!     RuleConfig[]
//!     → Compile matchers (exact, prefix, wildcard)
//!     → Sort by specificity, declaration order on ties
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Rules compiled with the topology, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same rule
//! - First match wins; a rule may fan out to several groups

pub mod matcher;
pub mod router;

pub use router::{ResolvedGroup, Router};
