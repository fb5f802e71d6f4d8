//! Usage telemetry: token counts and latency per model call attempt, failed ones included.
//!
//! Recording is a non-blocking channel send; a background task drains and logs.

use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Clone)]
pub struct UsageEvent {
    pub template: &'static str,
    /// Reported by the backend; `None` when the attempt failed before a response.
    pub model: Option<String>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency: Duration,
    pub attempt: u32,
    pub succeeded: bool,
}

/// Fire-and-forget sink for `UsageEvent`s. Cloning shares the same channel.
#[derive(Debug, Clone, Default)]
pub struct UsageRecorder {
    tx: Option<UnboundedSender<UsageEvent>>,
}

impl UsageRecorder {
    pub fn channel() -> (Self, UnboundedReceiver<UsageEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn record(&self, event: UsageEvent) {
        if let Some(tx) = &self.tx {
            // A closed receiver only means nobody is listening any more.
            let _ = tx.send(event);
        }
    }
}

/// Spawns the task that logs each event and running token totals.
pub fn spawn_usage_logger(mut rx: UnboundedReceiver<UsageEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut calls = 0u64;
        let mut failed = 0u64;
        let mut input_total = 0u64;
        let mut output_total = 0u64;

        while let Some(event) = rx.recv().await {
            calls += 1;
            if !event.succeeded {
                failed += 1;
            }
            input_total += u64::from(event.input_tokens);
            output_total += u64::from(event.output_tokens);
            info!(
                target: "summarizer::usage",
                template = event.template,
                model = event.model.as_deref().unwrap_or("-"),
                succeeded = event.succeeded,
                input_tokens = event.input_tokens,
                output_tokens = event.output_tokens,
                latency_ms = event.latency.as_millis() as u64,
                attempt = event.attempt,
                calls,
                failed,
                input_total,
                output_total,
                "model usage"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> UsageEvent {
        UsageEvent {
            template: "draft_summary",
            model: Some("test-model".to_string()),
            input_tokens: 10,
            output_tokens: 20,
            latency: Duration::from_millis(5),
            attempt: 1,
            succeeded: true,
        }
    }

    #[tokio::test]
    async fn test_record_delivers_to_receiver() {
        let (recorder, mut rx) = UsageRecorder::channel();
        recorder.record(event());
        let received = rx.recv().await.unwrap();
        assert_eq!(received.output_tokens, 20);
    }

    #[test]
    fn test_record_after_receiver_dropped_does_not_panic() {
        let (recorder, rx) = UsageRecorder::channel();
        drop(rx);
        recorder.record(event());
        UsageRecorder::default().record(event());
    }
}
