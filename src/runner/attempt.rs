//! Attempt loop of a single batch task.
//!
//! Every attempt gets its own child cancellation token. When the soft budget
//! runs out that token is cancelled, which makes the orchestrator stop before
//! its next document and return a partial result. If the attempt is still
//! running when the hard budget runs out, its future is dropped and the
//! attempt counts as failed with [`BatchError::AttemptTimedOut`], which is
//! retryable like any other batch-level fault.
//!
//! Shutdown is not a cancellation. The orchestrator is handed the runner's
//! shutdown token as its interrupt signal and stops before its next document
//! without touching the rest; the task stays RUNNING at its current attempt
//! and the next start resumes it.

use crate::error::{BatchError, Error, Result};
use crate::pipeline::CANCELLED_REASON;
use crate::retry::{IsRetryable, retry_delay};
use crate::types::{BatchId, ProcessingResult, TaskState};
use tokio_util::sync::CancellationToken;

use super::{QueuedTask, TaskRunner};

impl TaskRunner {
    /// Run a task to completion and record the outcome
    pub(crate) async fn execute_task(&self, task: QueuedTask, cancel: CancellationToken) {
        if let Err(e) = self.drive_task(task, &cancel).await {
            // The task row stays unfinished and is restored by the next start
            tracing::error!(
                task_id = task.task_id.0,
                batch_id = task.batch_id.0,
                error = %e,
                "failed to record batch task outcome"
            );
        }
    }

    async fn drive_task(&self, task: QueuedTask, cancel: &CancellationToken) -> Result<()> {
        let retry = &self.config.retry;
        let max_attempts = retry.max_attempts.max(task.first_attempt);
        let mut attempt = task.first_attempt;

        loop {
            if let Err(e) = self.tasks.mark_task_running(task.task_id, attempt).await {
                // Not fatal: the attempt itself will run into the same store
                tracing::warn!(task_id = task.task_id.0, attempt, error = %e, "failed to record attempt start");
            }
            tracing::info!(
                task_id = task.task_id.0,
                batch_id = task.batch_id.0,
                attempt,
                max_attempts,
                "batch attempt started"
            );

            let error = match self.run_attempt(task.batch_id, attempt, cancel).await {
                Ok(result) => return self.finish_with_result(task, attempt, &result).await,
                Err(e) => e,
            };

            if !error.is_retryable() || attempt >= max_attempts {
                return self.fail_task(task, attempt, error).await;
            }

            let delay = retry_delay(retry, attempt);
            tracing::warn!(
                task_id = task.task_id.0,
                batch_id = task.batch_id.0,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "batch attempt failed, retry scheduled"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return self.stop_during_backoff(task, attempt).await,
                _ = self.state.shutdown_token.cancelled() => {
                    return self.stop_during_backoff(task, attempt).await;
                }
            }
            attempt += 1;
        }
    }

    /// One invocation of the processor under the soft and hard budgets
    async fn run_attempt(
        &self,
        batch_id: BatchId,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<ProcessingResult> {
        let soft = self.config.runner.soft_time_limit;
        let hard = self.config.runner.hard_time_limit;
        let attempt_token = cancel.child_token();

        let interrupt = &self.state.shutdown_token;
        let work = self.processor.run_batch(batch_id, &attempt_token, interrupt);
        let budgeted = async {
            tokio::pin!(work);
            tokio::select! {
                result = &mut work => return result,
                _ = tokio::time::sleep(soft) => {
                    tracing::warn!(
                        batch_id = batch_id.0,
                        attempt,
                        soft_limit_secs = soft.as_secs(),
                        "soft time limit exceeded, requesting cancellation"
                    );
                    attempt_token.cancel();
                }
            }
            work.await
        };

        match tokio::time::timeout(hard, budgeted).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    batch_id = batch_id.0,
                    attempt,
                    hard_limit_secs = hard.as_secs(),
                    "hard time limit exceeded, attempt terminated"
                );
                Err(BatchError::AttemptTimedOut {
                    id: batch_id,
                    attempt,
                    limit_secs: hard.as_secs(),
                }
                .into())
            }
        }
    }

    async fn finish_with_result(
        &self,
        task: QueuedTask,
        attempt: u32,
        result: &ProcessingResult,
    ) -> Result<()> {
        if result.interrupted {
            tracing::info!(
                task_id = task.task_id.0,
                batch_id = task.batch_id.0,
                attempt,
                succeeded = result.succeeded,
                failed = result.failed,
                "batch interrupted by shutdown, task left for restore"
            );
            return Ok(());
        }

        if result.cancelled {
            tracing::warn!(
                task_id = task.task_id.0,
                batch_id = task.batch_id.0,
                attempt,
                succeeded = result.succeeded,
                failed = result.failed,
                "batch stopped by cancellation"
            );
            return self
                .tasks
                .finish_task(task.task_id, TaskState::Failed, Some(result), Some(CANCELLED_REASON))
                .await;
        }

        tracing::info!(
            task_id = task.task_id.0,
            batch_id = task.batch_id.0,
            attempt,
            succeeded = result.succeeded,
            failed = result.failed,
            skipped = result.skipped,
            cards_created = result.cards_created,
            "batch completed"
        );
        self.tasks
            .finish_task(task.task_id, TaskState::Succeeded, Some(result), None)
            .await
    }

    /// Terminal batch failure: unfinished documents become FAILED with the same message
    async fn fail_task(&self, task: QueuedTask, attempt: u32, error: Error) -> Result<()> {
        let message = if error.is_retryable() {
            BatchError::RetriesExhausted {
                id: task.batch_id,
                attempts: attempt,
                last_error: error.to_string(),
            }
            .to_string()
        } else {
            error.to_string()
        };

        tracing::error!(
            task_id = task.task_id.0,
            batch_id = task.batch_id.0,
            attempts = attempt,
            error = %message,
            "batch failed"
        );

        if let Err(e) = self
            .processor
            .fail_unfinished_documents(task.batch_id, &message)
            .await
        {
            tracing::error!(
                batch_id = task.batch_id.0,
                error = %e,
                "could not mark unfinished documents failed"
            );
        }

        self.tasks
            .finish_task(task.task_id, TaskState::Failed, None, Some(&message))
            .await
    }

    /// Cancellation arrived while waiting to retry
    async fn stop_during_backoff(&self, task: QueuedTask, attempt: u32) -> Result<()> {
        if self.state.shutdown_token.is_cancelled() {
            tracing::info!(
                task_id = task.task_id.0,
                batch_id = task.batch_id.0,
                attempt,
                "shutdown during retry backoff, task left for restore"
            );
            return Ok(());
        }

        self.processor
            .fail_unfinished_documents(task.batch_id, CANCELLED_REASON)
            .await?;
        tracing::info!(
            task_id = task.task_id.0,
            batch_id = task.batch_id.0,
            attempt,
            "batch cancelled during retry backoff"
        );
        self.tasks
            .finish_task(task.task_id, TaskState::Failed, None, Some(CANCELLED_REASON))
            .await
    }
}
