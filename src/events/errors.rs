//! Event propagation errors

use thiserror::Error;

use crate::store::StoreError;

pub type EventsResult<T> = Result<T, EventsError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventsError {
    #[error("Event queue unavailable: {0}")]
    Queue(#[from] StoreError),

    #[error("Undecodable event on {queue}: {reason}")]
    Decode { queue: String, reason: String },
}

impl EventsError {
    pub fn code(&self) -> &'static str {
        match self {
            EventsError::Queue(_) => "SBC_QUEUE_UNAVAILABLE",
            EventsError::Decode { .. } => "SBC_EVENT_DECODE",
        }
    }
}
