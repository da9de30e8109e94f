use aws_sdk_kinesis::error::ProvideErrorMetadata;
use aws_smithy_runtime_api::client::result::SdkError;

/// How a failed call should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Never retry; the caller sees this error immediately.
    Bail,
    /// Always retry, regardless of what the bail list says.
    ForceRetry,
    /// Retry subject to the call's overall policy (the common case).
    Default,
}

/// Error codes that must never be retried: they describe a request that will
/// never succeed no matter how many times it's repeated.
const BAIL_CODES: &[&str] = &[
    "ValidationException",
    "ResourceNotFoundException",
    "ConditionalCheckFailedException",
    "ExpiredIteratorException",
    "UnknownOperationException",
    "ResourceInUseException",
    "NoSuchBucket",
    "NoSuchKey",
    "InvalidArgumentException",
];

/// Classifies any `SdkError` whose service error implements `ProvideErrorMetadata`.
/// Transient transport failures (DNS resolution, connection refused, I/O timeouts)
/// are force-retried even though they carry no service error code.
pub fn classify<E, R>(err: &SdkError<E, R>) -> Classification
where
    E: ProvideErrorMetadata,
{
    match err {
        SdkError::DispatchFailure(failure) => {
            let transient = failure
                .as_connector_error()
                .map(|c| c.is_io() || c.is_timeout() || c.is_other().is_some())
                .unwrap_or(false);
            if transient {
                Classification::ForceRetry
            } else {
                Classification::Default
            }
        }
        SdkError::TimeoutError(_) => Classification::ForceRetry,
        other => match other.code() {
            Some(code) if BAIL_CODES.contains(&code) => Classification::Bail,
            _ => Classification::Default,
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use aws_smithy_types::error::ErrorMetadata;

    #[derive(Debug)]
    struct FakeServiceError(ErrorMetadata);

    impl std::fmt::Display for FakeServiceError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "fake service error")
        }
    }
    impl std::error::Error for FakeServiceError {}
    impl ProvideErrorMetadata for FakeServiceError {
        fn meta(&self) -> &ErrorMetadata {
            &self.0
        }
    }

    #[test]
    fn bail_codes_are_classified_as_bail() {
        let meta = ErrorMetadata::builder().code("ResourceNotFoundException").build();
        let err: SdkError<FakeServiceError, ()> =
            SdkError::service_error(FakeServiceError(meta), aws_smithy_runtime_api::http::Response::new(200.try_into().unwrap(), aws_smithy_types::body::SdkBody::empty()));
        assert_eq!(classify(&err), Classification::Bail);
    }

    #[test]
    fn unknown_codes_use_default_policy() {
        let meta = ErrorMetadata::builder().code("ProvisionedThroughputExceededException").build();
        let err: SdkError<FakeServiceError, ()> =
            SdkError::service_error(FakeServiceError(meta), aws_smithy_runtime_api::http::Response::new(200.try_into().unwrap(), aws_smithy_types::body::SdkBody::empty()));
        assert_eq!(classify(&err), Classification::Default);
    }
}
