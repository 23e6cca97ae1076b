use compute::{MergeError, NetworkError, UnionComputationError};
use formats::GeometryFormatError;
use foundation::math::ProjectionError;
use runtime::Ticket;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Format(#[from] GeometryFormatError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Union(#[from] UnionComputationError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("unknown or already resolved query ticket {0:?}")]
    UnknownTicket(Ticket),
    #[error("invalid engine config: {0}")]
    Config(String),
}

impl EngineError {
    /// Union and network failures can be retried without changing input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Union(_) | EngineError::Network(_))
    }
}

impl From<MergeError> for EngineError {
    fn from(e: MergeError) -> Self {
        match e {
            MergeError::Format(e) => EngineError::Format(e),
            MergeError::Union(e) => EngineError::Union(e),
            MergeError::Network(e) => EngineError::Network(e),
            MergeError::UnknownTicket(t) => EngineError::UnknownTicket(t),
        }
    }
}
