use thiserror::Error;

// ---------------------------------------------------------------------------
// Remote API errors
// ---------------------------------------------------------------------------

/// Errors returned by a `StreamApi` or `CdnSource` backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("remote resource not found: {resource}")]
    NotFound { resource: String },

    #[error("remote call returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport failure: {reason}")]
    Transport { reason: String },

    #[error("failed to decode remote response: {reason}")]
    Decode { reason: String },
}

impl ApiError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        ApiError::NotFound {
            resource: resource.into(),
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::NotFound { .. } => "not_found",
            ApiError::Status { .. } => "status",
            ApiError::Transport { .. } => "transport",
            ApiError::Decode { .. } => "decode",
        }
    }
}

// ---------------------------------------------------------------------------
// Filesystem errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the filesystem adapter.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("invalid upload content: {reason}")]
    InvalidContent { reason: String },

    #[error("unsupported operation: {operation}")]
    UnsupportedOperation { operation: &'static str },

    #[error("not found: {resource}")]
    RemoteNotFound { resource: String },

    #[error("remote failure (status {status}): {reason}")]
    RemoteFailure { status: u16, reason: String },

    #[error("transport failure: {reason}")]
    Transport { reason: String },
}

impl From<ApiError> for FsError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NotFound { resource } => FsError::RemoteNotFound { resource },
            ApiError::Status { status, body } => FsError::RemoteFailure {
                status,
                reason: body,
            },
            ApiError::Transport { reason } => FsError::Transport { reason },
            ApiError::Decode { reason } => FsError::RemoteFailure { status: 0, reason },
        }
    }
}
