//! Bounded worker pool for batch execution.
//!
//! `execute_many` submits each request as an independent task, bounded by
//! `max_workers` concurrent executions, and reassembles outcomes in input
//! order. A failing worker produces a failure outcome for its own slot; it
//! never poisons its peers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::client::Client;
use crate::outcome::{FailureDetail, OutcomeStatus, RequestOutcome};
use crate::request::Request;
use crate::scope::ConversationScope;

/// Start delay applied per worker slot to avoid a thundering herd at pool
/// startup.
const STARTUP_STAGGER: Duration = Duration::from_millis(10);

impl Client {
    /// Executes a batch of requests, returning one outcome per request in
    /// input order.
    ///
    /// When a [`ConversationScope`] is supplied, each request is enriched
    /// with the scope's conversation id at submission time, so every worker
    /// reads the same scoped context from its own task record.
    pub async fn execute_many(
        &self,
        requests: Vec<Request>,
        scope: Option<&ConversationScope>,
    ) -> Vec<RequestOutcome> {
        let total = requests.len();
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();

        for (index, request) in requests.into_iter().enumerate() {
            let request = match scope {
                Some(scope) => scope.enrich(request),
                None => request,
            };
            let client = self.clone();
            let semaphore = Arc::clone(&semaphore);
            // Only the first pool-width of tasks start immediately; stagger
            // them so they do not hit the limiter at the same instant.
            let stagger =
                STARTUP_STAGGER * index.min(self.max_workers.saturating_sub(1)) as u32;

            tasks.spawn(async move {
                tokio::time::sleep(stagger).await;
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("worker pool semaphore closed");
                (index, client.execute(request).await)
            });
        }

        let mut outcomes: Vec<Option<RequestOutcome>> = Vec::new();
        outcomes.resize_with(total, || None);

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(error) => {
                    tracing::error!(error = %error, "batch worker died before completing");
                }
            }
        }

        outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| outcome.unwrap_or_else(|| failed_worker(index)))
            .collect()
    }
}

fn failed_worker(index: usize) -> RequestOutcome {
    RequestOutcome {
        request_id: format!("worker-{index}"),
        status: OutcomeStatus::NonRetryable,
        status_code: None,
        attempts: 0,
        wait_time: Duration::ZERO,
        retry_time: Duration::ZERO,
        elapsed: Duration::ZERO,
        body: None,
        failure: Some(FailureDetail::WorkerFailed {
            message: "worker task did not complete".to_string(),
        }),
    }
}
