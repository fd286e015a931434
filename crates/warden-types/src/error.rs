//! Error types for Warden
//!
//! The engine must never silently fail open: every rejection is explicit,
//! typed, and carries enough context for the boundary to act on it.

use thiserror::Error;

/// Result type for Warden operations
pub type Result<T> = std::result::Result<T, WardenError>;

/// Warden error types
#[derive(Debug, Clone, Error)]
pub enum WardenError {
    // ========================================================================
    // Validation Errors
    // ========================================================================

    /// Capability id is not of the form `domain.category.operation`
    #[error("Invalid capability id '{id}': {reason}")]
    InvalidCapabilityId { id: String, reason: String },

    /// Domain segment does not name a known domain
    #[error("Unknown capability domain '{domain}'")]
    UnknownDomain { domain: String },

    /// Capability id is well-formed but absent from the catalog
    #[error("Unknown capability '{capability_id}'")]
    UnknownCapability { capability_id: String },

    /// A definition with this id is already registered
    #[error("Capability '{capability_id}' is already registered")]
    DuplicateCapability { capability_id: String },

    /// Definition is structurally invalid
    #[error("Invalid definition for '{capability_id}': {reason}")]
    InvalidDefinition {
        capability_id: String,
        reason: String,
    },

    /// Invalid caller input
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    // ========================================================================
    // Enforcement Errors
    // ========================================================================

    /// An enforced capability check failed. Raised only by the enforcing
    /// call path (`check_capability`), never by the query path.
    #[error("Permission denied: agent '{agent_id}' lacks '{capability_id}' for operation '{operation}': {reason}")]
    PermissionDenied {
        agent_id: String,
        capability_id: String,
        operation: String,
        reason: String,
    },

    /// An illegal governance lifecycle transition. This indicates the
    /// caller routed the wrong verdict and is a loud, logged defect.
    #[error("Invalid governance transition {from} -> {to}: {reason}")]
    StateTransition {
        from: String,
        to: String,
        reason: String,
    },

    // ========================================================================
    // Infrastructure Errors
    // ========================================================================

    /// The persistent store backing a write path has not been initialized.
    /// Modeled as a recoverable denial at the boundary, not a crash.
    #[error("Schema not ready for operation '{operation}'")]
    SchemaNotReady { operation: String },

    /// Store round-trip failed
    #[error("Store error: {message}")]
    Store { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl WardenError {
    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Check if this is a retriable error
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::SchemaNotReady { .. })
    }

    /// Get a machine error code for boundary responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCapabilityId { .. } => "INVALID_CAPABILITY_ID",
            Self::UnknownDomain { .. } => "UNKNOWN_DOMAIN",
            Self::UnknownCapability { .. } => "UNKNOWN_CAPABILITY",
            Self::DuplicateCapability { .. } => "DUPLICATE_CAPABILITY",
            Self::InvalidDefinition { .. } => "INVALID_DEFINITION",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::StateTransition { .. } => "STATE_TRANSITION",
            Self::SchemaNotReady { .. } => "SCHEMA_NOT_READY",
            Self::Store { .. } => "STORE_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = WardenError::PermissionDenied {
            agent_id: "agentA".to_string(),
            capability_id: "state.memory.read".to_string(),
            operation: "read_memory".to_string(),
            reason: "no active grant".to_string(),
        };
        assert_eq!(err.error_code(), "PERMISSION_DENIED");
    }

    #[test]
    fn test_retriable_errors() {
        assert!(WardenError::store("connection reset").is_retriable());
        assert!(WardenError::SchemaNotReady {
            operation: "grant".to_string()
        }
        .is_retriable());
        assert!(!WardenError::UnknownCapability {
            capability_id: "state.memory.read".to_string()
        }
        .is_retriable());
    }

    #[test]
    fn test_denial_message_carries_contract_fields() {
        let err = WardenError::PermissionDenied {
            agent_id: "agentA".to_string(),
            capability_id: "action.shell.exec".to_string(),
            operation: "exec".to_string(),
            reason: "no active grant".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("agentA"));
        assert!(msg.contains("action.shell.exec"));
        assert!(msg.contains("exec"));
    }
}
