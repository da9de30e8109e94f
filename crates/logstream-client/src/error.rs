use std::backtrace::Backtrace;

/// Failures surfaced by the log client wrapper.
///
/// Every variant carries a stable `code` when the provider gave one, and an
/// optional captured backtrace (populated only when `capture_stack_trace` is
/// enabled, per the environment knob in §6 of the specification).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{operation} failed with code {code:?}: {message}")]
    Provider {
        operation: &'static str,
        code: Option<String>,
        message: String,
        backtrace: Option<Backtrace>,
    },

    #[error("{operation} exhausted its retry budget after {attempts} attempts")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("credentials unavailable: {0}")]
    Credentials(String),
}

impl Error {
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Provider { code, .. } => code.as_deref(),
            Error::RetriesExhausted { source, .. } => source.code(),
            _ => None,
        }
    }

    pub fn provider<E: aws_sdk_kinesis::error::ProvideErrorMetadata>(
        operation: &'static str,
        err: &E,
        capture_stack_trace: bool,
    ) -> Self {
        Error::Provider {
            operation,
            code: err.code().map(str::to_owned),
            message: err.message().unwrap_or_default().to_owned(),
            backtrace: capture_stack_trace.then(Backtrace::capture),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
