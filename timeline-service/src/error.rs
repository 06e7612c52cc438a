/// Error types for timeline-service
use crate::domain::UserId;
use thiserror::Error;

/// Coarse classification used by the propagation policy: validation and
/// conflict errors are returned to the caller and never retried; dependency
/// errors are retryable at connection establishment and transient for the
/// consumer; internal errors are bugs or corrupt data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    Dependency,
    Internal,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("cannot follow yourself")]
    SelfFollow,

    #[error("user {follower_id} already follows user {target_id}")]
    AlreadyFollowing {
        follower_id: UserId,
        target_id: UserId,
    },

    #[error("user {follower_id} does not follow user {target_id}")]
    NotFollowing {
        follower_id: UserId,
        target_id: UserId,
    },

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(#[from] redis::RedisError),

    #[error("message bus error: {0}")]
    Bus(String),

    #[error("upstream call failed: {0}")]
    Upstream(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::SelfFollow
            | ServiceError::InvalidCursor(_)
            | ServiceError::InvalidInput(_) => ErrorKind::Validation,
            ServiceError::AlreadyFollowing { .. } | ServiceError::NotFollowing { .. } => {
                ErrorKind::Conflict
            }
            ServiceError::Storage(_) | ServiceError::Bus(_) | ServiceError::Upstream(_) => {
                ErrorKind::Dependency
            }
            ServiceError::Serialization(_) | ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a consumer should leave the message for redelivery rather
    /// than dropping it.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Dependency
    }
}

impl From<rdkafka::error::KafkaError> for ServiceError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        ServiceError::Bus(err.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::Upstream(err.to_string())
    }
}

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;
