//! Store adapter errors

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store adapter errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A watched key changed between read and commit
    #[error("Watched key changed before commit: {key}")]
    Conflict { key: String },

    /// The store cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored value does not decode
    #[error("Corrupt value at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl StoreError {
    /// Create a corruption error
    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller may retry the whole operation
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable() {
        assert!(StoreError::Conflict { key: "k".into() }.is_retriable());
        assert!(!StoreError::corrupt("k", "bad").is_retriable());
    }
}
