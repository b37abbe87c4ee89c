use thiserror::Error;

/// Reasons an inbound telemetry event is refused by a stream's ingest buffer.
/// Rejections are logged and dropped; they never stop the stream.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("event for stream '{got}' delivered to buffer of '{expected}'")]
    StreamMismatch { expected: String, got: String },

    #[error("stale or duplicate {kind} event: {reason}")]
    StaleOrDuplicate { kind: &'static str, reason: String },

    #[error("invalid {kind} event: {reason}")]
    Invalid { kind: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("unsupported time range '{0}' (expected one of 3min, 30min, 3h, 8h, 2d, 4d)")]
    InvalidRange(String),

    #[error("unsupported export entity '{0}' (expected metrics, alerts, loudness or ads)")]
    InvalidEntity(String),

    #[error("limit must be between 1 and {max}, got {got}")]
    InvalidLimit { got: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlertError {
    #[error("alert not found: {0}")]
    NotFound(String),

    #[error("alert {0} is already resolved")]
    AlreadyResolved(String),
}

/// Failure of one evaluation cycle. The cycle is discarded and the stream keeps
/// its last good snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("non-finite value for {metric}")]
    NonFinite { metric: &'static str },

    #[error("evaluation panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("stream not found: {0}")]
    UnknownStream(String),

    #[error("stream already monitored: {0}")]
    AlreadyExists(String),

    #[error("worker for stream {0} is no longer accepting commands")]
    WorkerGone(String),

    #[error("command queue for stream {0} is full")]
    QueueFull(String),

    #[error(transparent)]
    Alert(#[from] AlertError),
}

/// Error returned by the request/response surface.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CommandError {
    /// HTTP-style status code for transports that need one.
    pub fn status(&self) -> u16 {
        match self {
            CommandError::Invalid(_) | CommandError::Query(_) => 400,
            CommandError::NotFound(_) => 404,
            CommandError::Registry(err) => match err {
                RegistryError::UnknownStream(_) => 404,
                RegistryError::AlreadyExists(_) => 409,
                RegistryError::Alert(AlertError::NotFound(_)) => 404,
                RegistryError::Alert(AlertError::AlreadyResolved(_)) => 409,
                RegistryError::WorkerGone(_) => 500,
                RegistryError::QueueFull(_) => 500,
            },
            CommandError::Storage(_) | CommandError::Internal(_) => 500,
        }
    }
}

impl From<AlertError> for CommandError {
    fn from(err: AlertError) -> Self {
        CommandError::Registry(RegistryError::Alert(err))
    }
}
