use quay_infra::{ProtocolError, StoreError};

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<StoreError> for ClientError {
    fn from(err: StoreError) -> Self {
        Self::Protocol(ProtocolError::StoreUnavailable(err))
    }
}

impl ClientError {
    /// The protocol error behind this failure, if any.
    pub fn protocol(&self) -> Option<&ProtocolError> {
        match self {
            Self::Protocol(err) => Some(err),
            Self::Config(_) => None,
        }
    }
}
