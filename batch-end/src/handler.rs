// Batch state change handling

use common::github::StatusReporter;
use common::pipeline::{handle_batch_event, CompletionOutcome};
use common::storage::BookkeepingStore;
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared across invocations of one lambda instance
pub struct BatchEndHandler {
    bookkeeping: BookkeepingStore,
    reporter: Arc<dyn StatusReporter>,
}

impl BatchEndHandler {
    pub fn new(bookkeeping: BookkeepingStore, reporter: Arc<dyn StatusReporter>) -> Self {
        Self {
            bookkeeping,
            reporter,
        }
    }

    /// Returns a summary of what was done. Errors fail the invocation so the
    /// event is retried and the failure alarms.
    pub async fn handle(&self, event: Value) -> Result<Value, lambda_runtime::Error> {
        let outcome = handle_batch_event(&event, &self.bookkeeping, self.reporter.as_ref()).await?;
        Ok(match outcome {
            CompletionOutcome::Ignored => json!({"action": "ignored"}),
            CompletionOutcome::Reported { state, s3_dir } => json!({
                "action": "reported",
                "state": state,
                "job": s3_dir,
            }),
        })
    }
}
