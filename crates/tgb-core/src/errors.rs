use std::path::PathBuf;
use std::time::Duration;

/// Core error type for the bot API client.
///
/// Adapter crates map their specific errors into this type so the polling
/// engine can classify failures consistently (fatal vs rate-limited).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited: {description}")]
    RateLimited {
        retry_after: Option<Duration>,
        description: String,
    },

    #[error("request rejected (status {status:?}, code {error_code:?}): {description}")]
    Rejected {
        status: Option<u16>,
        error_code: Option<i64>,
        description: String,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid token file {}: {reason}", path.display())]
    TokenFile { path: PathBuf, reason: String },

    #[error("failed to acknowledge offset: {0}")]
    Unacknowledged(Box<Error>),

    #[error("{cause} (also failed to acknowledge offset: {ack})")]
    AlsoUnacknowledged { cause: Box<Error>, ack: Box<Error> },
}

impl Error {
    /// Advisory wait carried by a flood-control rejection.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after, .. } => *retry_after,
            Error::AlsoUnacknowledged { cause, .. } => cause.retry_after(),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        match self {
            Error::RateLimited { .. } => true,
            Error::AlsoUnacknowledged { cause, .. } => cause.is_rate_limited(),
            _ => false,
        }
    }

    /// Connectivity, decode and server-side rejections all abort a session the same way.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Rejected { .. } | Error::Json(_) | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
