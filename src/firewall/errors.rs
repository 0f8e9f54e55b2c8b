//! Firewall errors

use thiserror::Error;

use crate::registry::RegistryError;

pub type FirewallResult<T> = Result<T, FirewallError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FirewallError {
    /// Registry state could not be read or is inconsistent
    #[error("Firewall state unavailable: {0}")]
    State(String),

    #[error("Failed to write rule file {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("Apply command '{command}' failed: {reason}")]
    ApplyFailed { command: String, reason: String },
}

impl FirewallError {
    pub fn code(&self) -> &'static str {
        match self {
            FirewallError::State(_) => "SBC_FIREWALL_STATE",
            FirewallError::Write { .. } => "SBC_FIREWALL_WRITE",
            FirewallError::ApplyFailed { .. } => "SBC_FIREWALL_APPLY",
        }
    }
}

impl From<RegistryError> for FirewallError {
    fn from(err: RegistryError) -> Self {
        FirewallError::State(err.to_string())
    }
}
