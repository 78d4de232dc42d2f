use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service-level errors with user-facing messages
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service is shutting down")]
    ShuttingDown,

    #[error("too many requests in flight")]
    Overloaded,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown route: {0}")]
    UnknownRoute(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}
