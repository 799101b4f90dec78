//! Background execution of batches with batch-level retry.
//!
//! The [`TaskRunner`] takes batch ids off the request path, runs them on a
//! bounded number of workers and records every task in the `batch_tasks`
//! table so callers can poll for the outcome:
//! - [`enqueue_batch`](TaskRunner::enqueue_batch) - schedule a batch, at most one live task per batch
//! - [`get_batch_result`](TaskRunner::get_batch_result) - poll a task
//! - [`cancel_batch`](TaskRunner::cancel_batch) - cooperative cancellation
//! - [`start`](TaskRunner::start) / [`shutdown`](TaskRunner::shutdown) - see [`lifecycle`]
//!
//! Each attempt runs under a soft and a hard time budget (see [`attempt`]).
//! Retryable batch-level failures are retried with exponential backoff; once
//! the attempts are used up every unfinished document of the batch is marked
//! FAILED and the task is recorded as failed.

mod attempt;
mod lifecycle;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::pipeline::{BatchProcessor, CANCELLED_REASON};
use crate::store::TaskStore;
use crate::types::{BatchId, BatchTaskStatus, TaskId, TaskState};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// A task waiting for a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueuedTask {
    pub(crate) task_id: TaskId,
    pub(crate) batch_id: BatchId,
    /// Attempt number the worker starts with (greater than 1 for restored tasks)
    pub(crate) first_attempt: u32,
}

/// A task that holds a worker slot, with the token that cancels it
#[derive(Debug, Clone)]
pub(crate) struct ActiveBatch {
    pub(crate) batch_id: BatchId,
    pub(crate) cancel: CancellationToken,
}

/// Queue and worker state shared by every clone of the runner
#[derive(Clone)]
pub(crate) struct RunnerState {
    /// Tasks accepted but not yet picked up by a worker
    pub(crate) queue: Arc<tokio::sync::Mutex<VecDeque<QueuedTask>>>,
    /// Wakes the dispatcher when the queue gains an entry
    pub(crate) queue_notify: Arc<tokio::sync::Notify>,
    /// Limits concurrently executing batches (max_concurrent_batches)
    pub(crate) concurrent_limit: Arc<tokio::sync::Semaphore>,
    /// Executing tasks; keyed by task so a rerun of the same batch gets its own entry
    pub(crate) active_batches: Arc<tokio::sync::Mutex<HashMap<TaskId, ActiveBatch>>>,
    /// Serializes the find-then-create step of `enqueue_batch`
    pub(crate) enqueue_lock: Arc<tokio::sync::Mutex<()>>,
    /// Set to false once shutdown starts
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Cancelled on shutdown; running batches stop between documents and stay restorable
    pub(crate) shutdown_token: CancellationToken,
}

/// Schedules batches for asynchronous processing (cloneable, all fields are Arc-wrapped)
#[derive(Clone)]
pub struct TaskRunner {
    pub(crate) config: Arc<Config>,
    pub(crate) tasks: Arc<dyn TaskStore>,
    pub(crate) processor: Arc<dyn BatchProcessor>,
    pub(crate) state: RunnerState,
}

impl TaskRunner {
    /// Create a runner
    ///
    /// Nothing executes until [`start`](Self::start) spawns the dispatcher;
    /// batches enqueued before that wait in the queue.
    pub fn new(
        config: Config,
        tasks: Arc<dyn TaskStore>,
        processor: Arc<dyn BatchProcessor>,
    ) -> Self {
        let state = RunnerState {
            queue: Arc::new(tokio::sync::Mutex::new(VecDeque::new())),
            queue_notify: Arc::new(tokio::sync::Notify::new()),
            concurrent_limit: Arc::new(tokio::sync::Semaphore::new(
                config.runner.max_concurrent_batches.max(1),
            )),
            active_batches: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            enqueue_lock: Arc::new(tokio::sync::Mutex::new(())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown_token: CancellationToken::new(),
        };

        Self {
            config: Arc::new(config),
            tasks,
            processor,
            state,
        }
    }

    /// Schedule a batch and return the id of the task tracking it
    ///
    /// If a pending or running task already exists for the batch, its id is
    /// returned and nothing new is scheduled.
    ///
    /// # Errors
    ///
    /// [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has started,
    /// or a database error if the task could not be recorded.
    pub async fn enqueue_batch(&self, batch_id: BatchId) -> Result<TaskId> {
        if !self.state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let _guard = self.state.enqueue_lock.lock().await;

        if let Some(existing) = self.tasks.find_active_task_for_batch(batch_id).await? {
            tracing::debug!(
                batch_id = batch_id.0,
                task_id = existing.0,
                "batch already scheduled, returning existing task"
            );
            return Ok(existing);
        }

        let task_id = self.tasks.create_task(batch_id).await?;
        self.push(QueuedTask {
            task_id,
            batch_id,
            first_attempt: 1,
        })
        .await;

        tracing::info!(batch_id = batch_id.0, task_id = task_id.0, "batch enqueued");
        Ok(task_id)
    }

    /// Current state of a task, including the result once it finished
    pub async fn get_batch_result(&self, task_id: TaskId) -> Result<BatchTaskStatus> {
        self.tasks
            .get_task(task_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("batch task {}", task_id)))
    }

    /// Request cancellation of a batch
    ///
    /// An executing batch stops before its next document. A batch still
    /// waiting in the queue is dropped from it and its documents are marked
    /// FAILED. Returns `false` if the batch is neither queued nor running.
    pub async fn cancel_batch(&self, batch_id: BatchId) -> Result<bool> {
        {
            let active = self.state.active_batches.lock().await;
            let mut found = false;
            let matching = active.iter().filter(|(_, entry)| entry.batch_id == batch_id);
            for (task_id, entry) in matching {
                tracing::info!(
                    batch_id = batch_id.0,
                    task_id = task_id.0,
                    "cancellation requested"
                );
                entry.cancel.cancel();
                found = true;
            }
            if found {
                return Ok(true);
            }
        }

        let queued = {
            let mut queue = self.state.queue.lock().await;
            let position = queue.iter().position(|task| task.batch_id == batch_id);
            position.and_then(|index| queue.remove(index))
        };

        let Some(task) = queued else {
            return Ok(false);
        };

        self.processor
            .fail_unfinished_documents(batch_id, CANCELLED_REASON)
            .await?;
        self.tasks
            .finish_task(task.task_id, TaskState::Failed, None, Some(CANCELLED_REASON))
            .await?;

        tracing::info!(
            batch_id = batch_id.0,
            task_id = task.task_id.0,
            "queued batch cancelled"
        );
        Ok(true)
    }

    /// Number of batches currently executing
    pub async fn active_count(&self) -> usize {
        self.state.active_batches.lock().await.len()
    }

    pub(crate) async fn push(&self, task: QueuedTask) {
        self.state.queue.lock().await.push_back(task);
        self.state.queue_notify.notify_one();
    }
}
