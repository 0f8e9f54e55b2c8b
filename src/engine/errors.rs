//! Call-engine errors

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Call engine at {address} unreachable: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("Call engine rejected authentication: {0}")]
    AuthRejected(String),

    #[error("Call engine protocol error: {0}")]
    Protocol(String),

    #[error("Call engine timed out: {0}")]
    Timeout(String),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Unreachable { .. } => "SBC_ENGINE_UNREACHABLE",
            EngineError::AuthRejected(_) => "SBC_ENGINE_AUTH",
            EngineError::Protocol(_) => "SBC_ENGINE_PROTOCOL",
            EngineError::Timeout(_) => "SBC_ENGINE_TIMEOUT",
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}
