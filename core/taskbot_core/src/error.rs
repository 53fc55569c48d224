/// Errors raised by task operations and command parsing.
///
/// `Usage`, `NotFound` and `Duplicate` are user-facing: handlers turn them into a
/// reply and nothing in the store changes. `Storage` aborts the operation.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl BotError {
    pub fn usage(msg: impl Into<String>) -> Self {
        BotError::Usage(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        BotError::NotFound(msg.into())
    }

    /// True for errors the user can fix by sending a different command.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, BotError::Storage(_))
    }
}

pub type BotResult<T> = Result<T, BotError>;

/// Outbound message delivery failed. Logged, never retried.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat api returned {status}: {description}")]
    Api { status: u16, description: String },
}
