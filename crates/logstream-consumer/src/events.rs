use logstream_codec::DecodedRecord;
use logstream_types::ShardId;
use tokio::sync::{mpsc, oneshot};

/// Handed to the consumer when `use_auto_checkpoints` is disabled, letting it
/// decide exactly when a sequence number is considered safely processed.
#[derive(Debug, Clone)]
pub struct CheckpointSetter(mpsc::UnboundedSender<String>);

impl CheckpointSetter {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    /// Records `sequence_number` as the shard's checkpoint. Silently dropped
    /// if the reader has already stopped.
    pub fn set_checkpoint(&self, sequence_number: impl Into<String>) {
        let _ = self.0.send(sequence_number.into());
    }
}

/// Handed to the consumer when `use_paused_polling` is enabled; the reader
/// will not issue its next `get_records` call until this is invoked.
#[derive(Debug)]
pub struct ContinuePolling(oneshot::Sender<()>);

impl ContinuePolling {
    pub(crate) fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    pub fn continue_polling(self) {
        let _ = self.0.send(());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn checkpoint_setter_delivers_to_its_receiver() {
        let (setter, mut rx) = CheckpointSetter::new();
        setter.set_checkpoint("49590338271490256608559692540265062466302697338118488082");
        assert_eq!(
            rx.try_recv().unwrap(),
            "49590338271490256608559692540265062466302697338118488082"
        );
    }

    #[test]
    fn checkpoint_setter_send_after_receiver_dropped_is_silently_ignored() {
        let (setter, rx) = CheckpointSetter::new();
        drop(rx);
        setter.set_checkpoint("123");
    }

    #[tokio::test]
    async fn continue_polling_wakes_its_receiver() {
        let (continue_polling, rx) = ContinuePolling::new();
        continue_polling.continue_polling();
        rx.await.expect("sender fired before being dropped");
    }

    #[tokio::test]
    async fn dropping_continue_polling_without_firing_closes_the_receiver() {
        let (continue_polling, rx) = ContinuePolling::new();
        drop(continue_polling);
        assert!(rx.await.is_err());
    }
}

/// One emission from a per-shard reader to the facade's output stream.
#[derive(Debug)]
pub enum ConsumerEvent {
    Records {
        shard_id: ShardId,
        log_name: String,
        records: Vec<DecodedRecord>,
        millis_behind_latest: i64,
        continuation_sequence_number: Option<String>,
        checkpoint: Option<CheckpointSetter>,
        continue_polling: Option<ContinuePolling>,
    },
    Stats {
        owned_shard_count: usize,
    },
    Error {
        shard_id: Option<ShardId>,
        message: String,
    },
}
