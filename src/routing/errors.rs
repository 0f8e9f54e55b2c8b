//! Routing errors

use thiserror::Error;

use crate::registry::RegistryError;

pub type RoutingResult<T> = Result<T, RoutingError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("Routing table '{0}' not found")]
    UnknownTable(String),

    #[error("Outbound interconnection '{0}' not found")]
    UnknownInterconnection(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl RoutingError {
    pub fn code(&self) -> &'static str {
        match self {
            RoutingError::UnknownTable(_) | RoutingError::UnknownInterconnection(_) => {
                "SBC_NOT_FOUND"
            }
            RoutingError::Registry(err) => err.code(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            RoutingError::UnknownTable(_) | RoutingError::UnknownInterconnection(_) => 404,
            RoutingError::Registry(err) => err.status_code(),
        }
    }
}
