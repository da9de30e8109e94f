#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("record is missing required field {0:?}")]
    MissingField(&'static str),

    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),

    #[error("blob store {operation} failed with code {code:?}: {message}")]
    BlobStore {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },

    #[error("malformed aggregated record: {0}")]
    MalformedAggregate(#[source] prost::DecodeError),
}

pub type Result<T> = std::result::Result<T, Error>;
