//! Error types for the calminder engines.

/// Top-level error type for the reminder and sync engines.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error. The engine behind the channel is gone.
    #[error("channel error: {0}")]
    Channel(String),

    /// Host contract violation (bad envelope, malformed payload).
    #[error("contract error: {0}")]
    Contract(String),

    /// Reminder evaluation error (fire time computation, tick failure).
    #[error("reminder error: {0}")]
    Reminder(String),

    /// Sync batch error raised outside a single source.
    #[error("sync error: {0}")]
    Sync(String),

    /// Calendar feed could not be fetched.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Event or source store error.
    #[error("store error: {0}")]
    Store(String),

    /// Credential provider error.
    #[error("credentials error: {0}")]
    Credentials(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, EngineError>;
