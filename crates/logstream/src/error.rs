use std::backtrace::Backtrace;

/// Top-level facade error, composed from every component's crate-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] logstream_client::Error),

    #[error(transparent)]
    Coordinator(#[from] logstream_coordinator::Error),

    #[error(transparent)]
    Codec(#[from] logstream_codec::Error),

    #[error(transparent)]
    Consumer(#[from] logstream_consumer::Error),

    #[error("credentials unavailable: {message}")]
    Credentials { message: String, backtrace: Option<Backtrace> },
}

/// Raised synchronously at construction; never retried.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown compression {0:?}")]
    UnknownCompression(String),

    #[error("{field} is required when {reason}")]
    MissingField { field: &'static str, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;
