use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolExecError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("argument validation failed: {0}")]
    Validation(String),

    #[error("tool call denied: arguments contain PHI but the tool does not accept it")]
    PhiViolation,

    #[error("rate limit exceeded, retry after {0:?}")]
    RateLimited(std::time::Duration),

    #[error("confirmation was declined")]
    ConfirmationDenied,

    #[error("confirmation was not received within the timeout")]
    ConfirmationTimeout,

    #[error("tool call was cancelled")]
    Cancelled,

    #[error("tool execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("tool execution failed: {0}")]
    Internal(String),
}

impl From<ToolExecError> for qorch_core::ToolErrorKind {
    fn from(err: ToolExecError) -> Self {
        use qorch_core::ToolErrorKind;
        match err {
            ToolExecError::NotFound(_) | ToolExecError::Validation(_) => ToolErrorKind::ValidationError,
            ToolExecError::PhiViolation => ToolErrorKind::PhiViolation,
            ToolExecError::RateLimited(_) => ToolErrorKind::RateLimitExceeded,
            ToolExecError::ConfirmationDenied | ToolExecError::Cancelled => ToolErrorKind::PermissionDenied,
            ToolExecError::ConfirmationTimeout | ToolExecError::Timeout(_) => ToolErrorKind::Timeout,
            ToolExecError::Internal(_) => ToolErrorKind::InternalError,
        }
    }
}
