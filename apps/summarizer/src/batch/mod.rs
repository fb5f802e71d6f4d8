//! Batch scheduler — runs many pipeline instances with bounded concurrency.
//!
//! Each item runs in its own task behind a semaphore permit. A failed or panicking run
//! is reported for that item only; siblings keep going. Results come back in completion
//! order; callers that need submission order reorder by `work_item_id`.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::WorkItem;
use crate::pipeline::{CancelToken, Pipeline, RunOutcome};

#[derive(Debug)]
pub enum BatchItemResult {
    /// The run reached a terminal node; `outcome.result` says which.
    Completed(RunOutcome),
    /// The run's task died before producing an outcome.
    Crashed { work_item_id: Uuid, reason: String },
}

impl BatchItemResult {
    pub fn work_item_id(&self) -> Uuid {
        match self {
            BatchItemResult::Completed(outcome) => outcome.work_item_id,
            BatchItemResult::Crashed { work_item_id, .. } => *work_item_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BatchItemResult::Completed(outcome) if outcome.is_success())
    }
}

pub struct BatchScheduler {
    pipeline: Arc<Pipeline>,
    concurrency: usize,
}

impl BatchScheduler {
    pub fn new(pipeline: Arc<Pipeline>, concurrency: usize) -> Self {
        Self {
            pipeline,
            concurrency: concurrency.max(1),
        }
    }

    /// Runs every item to completion. Cancelling `cancel` fails the runs that have not
    /// finished yet; each still gets a result.
    pub async fn run(&self, items: Vec<WorkItem>, cancel: CancelToken) -> Vec<BatchItemResult> {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        info!(items = total, concurrency = self.concurrency, "Batch started");

        for item in items {
            let pipeline = self.pipeline.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.child();
            tasks.spawn(async move {
                let work_item_id = item.id;
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return BatchItemResult::Crashed {
                        work_item_id,
                        reason: "scheduler shut down".to_string(),
                    };
                };

                // Inner task so a panic is caught here and still attributed to this item.
                let run =
                    tokio::spawn(async move { pipeline.run_with_cancel(&item, cancel).await });
                match run.await {
                    Ok(outcome) => BatchItemResult::Completed(outcome),
                    Err(e) => {
                        error!(%work_item_id, "Pipeline task failed: {e}");
                        BatchItemResult::Crashed {
                            work_item_id,
                            reason: if e.is_panic() {
                                "run panicked".to_string()
                            } else {
                                "run was aborted".to_string()
                            },
                        }
                    }
                }
            });
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!("Batch worker task failed: {e}"),
            }
        }

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            items = total,
            succeeded,
            failed = results.len() - succeeded,
            "Batch finished"
        );
        results
    }
}
