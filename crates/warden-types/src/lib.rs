//! Warden Types - Canonical domain types for capability governance
//!
//! This crate contains all foundational types for Warden with zero dependencies
//! on other warden crates. It defines the complete type system for:
//!
//! - Identity types (AgentId, GrantId, SessionId, etc.)
//! - Capability ids, domains, permission and risk levels
//! - Trust states and policy verdicts
//! - Governance decision statuses
//! - The error taxonomy shared by every layer
//!
//! # Architectural Invariants
//!
//! These types support the core Warden security invariants:
//!
//! 1. Every enforcement decision is typed — no stringly-typed verdicts
//! 2. A capability id referenced anywhere must exist in the Catalog
//! 3. Denials carry agent, capability, operation and reason
//! 4. The engine never fails open: unknown inputs are validation errors

pub mod capability;
pub mod error;
pub mod identity;
pub mod records;
pub mod verdict;

pub use capability::*;
pub use error::*;
pub use identity::*;
pub use records::*;
pub use verdict::*;

/// Version of the Warden types schema
pub const TYPES_VERSION: &str = "0.1.0";

/// Epoch-millisecond timestamp used across persisted records.
pub type TimestampMs = i64;

/// Current time as epoch milliseconds.
pub fn now_ms() -> TimestampMs {
    chrono::Utc::now().timestamp_millis()
}
