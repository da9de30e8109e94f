//! A retrying, classified wrapper over the log vendor's API (AWS Kinesis Data Streams).
//!
//! Every call returns a typed [`Error`] that preserves the provider's stable `code`,
//! and is routed through [`Client::retrying`] with a [`retry::RetryPolicy`] selected
//! by whether the operation is retried at all (§4.1 of the specification).

mod classify;
mod error;
pub mod ops;
pub mod retry;

pub use error::{Error, Result};

use aws_sdk_kinesis::error::ProvideErrorMetadata;
use aws_smithy_runtime_api::client::result::SdkError;
use classify::Classification;
use logstream_metrics::MetricsHandle;
use retry::{ExponentialBackoff, NoRetry, RetryPolicy};
use std::future::Future;
use std::sync::Arc;

/// Thin wrapper over `aws_sdk_kinesis::Client` adding uniform retry, error
/// classification, and metrics reporting to every call.
#[derive(Clone)]
pub struct Client {
    pub(crate) kinesis: aws_sdk_kinesis::Client,
    pub(crate) metrics: MetricsHandle,
    pub(crate) capture_stack_trace: bool,
    retried_policy: Arc<ExponentialBackoff>,
    non_retried_policy: Arc<NoRetry>,
}

impl Client {
    pub fn new(kinesis: aws_sdk_kinesis::Client, metrics: MetricsHandle, capture_stack_trace: bool) -> Self {
        Self {
            kinesis,
            metrics,
            capture_stack_trace,
            retried_policy: Arc::new(ExponentialBackoff::new()),
            non_retried_policy: Arc::new(NoRetry),
        }
    }

    /// Runs `call` to completion, retrying per `policy` on every non-bailed failure.
    /// `operation` names the call for metrics and error messages.
    pub(crate) async fn run<T, E, Fut, F>(
        &self,
        operation: &'static str,
        policy: &dyn RetryPolicy,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, SdkError<E, aws_smithy_runtime_api::http::Response>>>,
        E: aws_sdk_kinesis::error::ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => {
                    policy.reset();
                    return Ok(value);
                }
                Err(err) => {
                    let classification = classify::classify(&err);
                    self.metrics.record_retry(operation);

                    if classification == Classification::Bail {
                        return Err(self.to_error(operation, &err));
                    }

                    match policy.next_backoff(attempt) {
                        Some(delay) => {
                            tracing::warn!(operation, attempt, ?delay, error = %err, "retrying log client call");
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(self.to_error(operation, &err)),
                    }
                }
            }
        }
    }

    pub(crate) fn retried_policy(&self) -> &dyn RetryPolicy {
        self.retried_policy.as_ref()
    }

    pub(crate) fn non_retried_policy(&self) -> &dyn RetryPolicy {
        self.non_retried_policy.as_ref()
    }

    fn to_error<E, R>(&self, operation: &'static str, err: &SdkError<E, R>) -> Error
    where
        E: aws_sdk_kinesis::error::ProvideErrorMetadata,
    {
        Error::Provider {
            operation,
            code: err.code().map(str::to_owned),
            message: err.message().unwrap_or_default().to_owned(),
            backtrace: self
                .capture_stack_trace
                .then(std::backtrace::Backtrace::capture),
        }
    }
}
