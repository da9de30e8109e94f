use crate::{Client, Result};
use aws_sdk_kinesis::types::ConsumerDescription;

impl Client {
    /// `list-stream-consumers` (retried).
    pub async fn list_stream_consumers(&self, stream_arn: &str) -> Result<Vec<aws_sdk_kinesis::types::Consumer>> {
        let out = self
            .run("list_stream_consumers", self.retried_policy(), || {
                self.kinesis.list_stream_consumers().stream_arn(stream_arn).send()
            })
            .await?;
        Ok(out.consumers.unwrap_or_default())
    }

    /// `register-consumer` (non-retried). Registers an enhanced fan-out endpoint.
    pub async fn register_stream_consumer(
        &self,
        stream_arn: &str,
        consumer_name: &str,
    ) -> Result<ConsumerDescription> {
        let out = self
            .run("register_stream_consumer", self.non_retried_policy(), || {
                self.kinesis
                    .register_stream_consumer()
                    .stream_arn(stream_arn)
                    .consumer_name(consumer_name)
                    .send()
            })
            .await?;
        out.consumer.ok_or_else(|| {
            crate::Error::Provider {
                operation: "register_stream_consumer",
                code: None,
                message: "response carried no consumer description".into(),
                backtrace: None,
            }
        })
    }

    /// `deregister-consumer` (non-retried).
    pub async fn deregister_stream_consumer(&self, consumer_arn: &str) -> Result<()> {
        self.run("deregister_stream_consumer", self.non_retried_policy(), || {
            self.kinesis
                .deregister_stream_consumer()
                .consumer_arn(consumer_arn)
                .send()
        })
        .await?;
        Ok(())
    }
}
