#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] logstream_client::Error),

    #[error(transparent)]
    Coordinator(#[from] logstream_coordinator::Error),

    #[error(transparent)]
    Codec(#[from] logstream_codec::Error),

    #[error("the log no longer exists")]
    LogGone,
}

pub type Result<T> = std::result::Result<T, Error>;
