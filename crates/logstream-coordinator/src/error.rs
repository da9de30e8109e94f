/// Failures surfaced by a [`crate::CoordinatorStore`]. A version conflict is
/// never represented here: it is a normal outcome (`LockOutcome::Conflict`,
/// `ReleaseOutcome::Conflict`), not a failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{operation} failed with code {code:?}: {message}")]
    Provider {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },

    #[error("document for group {group:?} / log {log_name:?} was malformed: {source}")]
    Corrupt {
        group: String,
        log_name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
