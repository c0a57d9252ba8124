use takjil_core::{CodeError, ProtocolError, SessionCode};

use crate::relay::RelayError;
use crate::store::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("Session not found or already finished: {0}")]
    NotFound(SessionCode),

    #[error("Could not reach session storage: {0}")]
    Persistence(#[from] StoreError),

    #[error("Session channel unavailable: {0}")]
    ChannelUnavailable(#[from] RelayError),

    #[error("Only the session host can perform this action: {0}")]
    HostOnly(&'static str),

    #[error(transparent)]
    InvalidCode(#[from] CodeError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// Whether the user can retry the same action. A lost channel is not
    /// recoverable in place; the client has to join again.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SessionError::NotFound(_)
            | SessionError::Persistence(_)
            | SessionError::InvalidCode(_) => true,
            SessionError::ChannelUnavailable(_)
            | SessionError::HostOnly(_)
            | SessionError::Protocol(_) => false,
        }
    }
}
