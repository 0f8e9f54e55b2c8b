//! # Registry Errors
//!
//! Error taxonomy surfaced to registry callers. Every mutation failure
//! leaves the store untouched.

use thiserror::Error;

use super::entity::EntityClass;
use crate::config::ConfigError;
use crate::store::StoreError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    // ==================
    // Caller Errors
    // ==================
    /// Identifier absent
    #[error("{class} '{id}' not found")]
    NotFound { class: EntityClass, id: String },

    /// Name collision within the class
    #[error("{class} '{id}' already exists")]
    AlreadyExists { class: EntityClass, id: String },

    /// Delete blocked while other entities depend on this one
    #[error("{class} '{id}' is engaged by {}", by.join(", "))]
    Engaged {
        class: EntityClass,
        id: String,
        by: Vec<String>,
    },

    /// Field-scoped rule violation
    #[error("Validation failed on '{field}': {rule}")]
    ValidationFailed { field: String, rule: String },

    // ==================
    // Concurrency
    // ==================
    /// A watched key moved between read and commit; retry the whole call
    #[error("Concurrent modification of '{key}'")]
    Conflict { key: String },

    // ==================
    // Server Errors
    // ==================
    /// Store or call engine unreachable
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Stored data could not be interpreted
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    pub fn validation(field: impl Into<String>, rule: impl Into<String>) -> Self {
        Self::ValidationFailed {
            field: field.into(),
            rule: rule.into(),
        }
    }

    pub fn not_found(class: EntityClass, id: impl Into<String>) -> Self {
        Self::NotFound {
            class,
            id: id.into(),
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::NotFound { .. } => "SBC_NOT_FOUND",
            RegistryError::AlreadyExists { .. } => "SBC_ALREADY_EXISTS",
            RegistryError::Engaged { .. } => "SBC_ENGAGED",
            RegistryError::ValidationFailed { .. } => "SBC_VALIDATION_FAILED",
            RegistryError::Conflict { .. } => "SBC_CONFLICT",
            RegistryError::UpstreamUnavailable(_) => "SBC_UPSTREAM_UNAVAILABLE",
            RegistryError::Internal(_) => "SBC_INTERNAL",
        }
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> u16 {
        match self {
            RegistryError::NotFound { .. } => 404,
            RegistryError::AlreadyExists { .. } => 409,
            RegistryError::Engaged { .. } => 409,
            RegistryError::Conflict { .. } => 409,
            RegistryError::ValidationFailed { .. } => 422,
            RegistryError::UpstreamUnavailable(_) => 503,
            RegistryError::Internal(_) => 500,
        }
    }

    /// Whether the caller may retry the same call unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegistryError::Conflict { .. } | RegistryError::UpstreamUnavailable(_)
        )
    }
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { key } => RegistryError::Conflict { key },
            StoreError::Unavailable(reason) => RegistryError::UpstreamUnavailable(reason),
            StoreError::Corrupt { key, reason } => {
                RegistryError::Internal(format!("corrupt record {}: {}", key, reason))
            }
        }
    }
}

impl From<ConfigError> for RegistryError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::StaleVersion { .. } => RegistryError::Conflict {
                key: "cluster:attributes".to_string(),
            },
            other => RegistryError::validation("cluster", other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            RegistryError::not_found(EntityClass::Gateway, "gw1").status_code(),
            404
        );
        assert_eq!(RegistryError::validation("port", "range").status_code(), 422);
        assert_eq!(
            RegistryError::Conflict { key: "k".into() }.status_code(),
            409
        );
    }

    #[test]
    fn test_store_conflict_maps_to_conflict() {
        let err: RegistryError = StoreError::Conflict { key: "k".into() }.into();
        assert_eq!(err.code(), "SBC_CONFLICT");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_engaged_message_lists_dependents() {
        let err = RegistryError::Engaged {
            class: EntityClass::Gateway,
            id: "gw1".into(),
            by: vec!["out:c1".into(), "out:c2".into()],
        };
        assert_eq!(err.to_string(), "gateway 'gw1' is engaged by out:c1, out:c2");
        assert!(!err.is_retryable());
    }
}
