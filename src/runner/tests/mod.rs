//! Runner tests run against in-memory fakes on a paused clock, so backoff
//! and time budgets can be asserted to the second.

use crate::config::Config;
use crate::error::{BatchError, DatabaseError, Error, Result};
use crate::pipeline::BatchProcessor;
use crate::runner::TaskRunner;
use crate::store::TaskStore;
use crate::types::{BatchId, BatchTaskStatus, ProcessingResult, TaskId, TaskState};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;


// ----------------------------------------------------------------------------
// In-memory task store
// ----------------------------------------------------------------------------

#[derive(Default)]
pub(super) struct MemoryTaskStore {
    tasks: Mutex<Vec<BatchTaskStatus>>,
    finish_gate: Mutex<Option<Arc<Notify>>>,
}

impl MemoryTaskStore {
    /// Make the next `finish_task` record its outcome, then wait for the returned gate
    pub fn hold_next_finish(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.finish_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn with_task<T>(&self, id: TaskId, f: impl FnOnce(&mut BatchTaskStatus) -> T) -> Result<T> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .iter_mut()
            .find(|t| t.task_id == id)
            .ok_or_else(|| Error::NotFound(format!("batch task {id}")))?;
        task.updated_at = chrono::Utc::now();
        Ok(f(task))
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create_task(&self, batch_id: BatchId) -> Result<TaskId> {
        let mut tasks = self.tasks.lock().unwrap();
        let task_id = TaskId(tasks.len() as i64 + 1);
        let now = chrono::Utc::now();
        tasks.push(BatchTaskStatus {
            task_id,
            batch_id,
            state: TaskState::Pending,
            attempts: 0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        });
        Ok(task_id)
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<BatchTaskStatus>> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks.iter().find(|t| t.task_id == id).cloned())
    }

    async fn find_active_task_for_batch(&self, batch_id: BatchId) -> Result<Option<TaskId>> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks
            .iter()
            .find(|t| t.batch_id == batch_id && !t.state.is_finished())
            .map(|t| t.task_id))
    }

    async fn mark_task_running(&self, id: TaskId, attempt: u32) -> Result<()> {
        self.with_task(id, |t| {
            t.state = TaskState::Running;
            t.attempts = attempt;
        })
    }

    async fn finish_task(
        &self,
        id: TaskId,
        state: TaskState,
        result: Option<&ProcessingResult>,
        error: Option<&str>,
    ) -> Result<()> {
        self.with_task(id, |t| {
            t.state = state;
            t.result = result.cloned();
            t.error = error.map(str::to_string);
        })?;

        let gate = self.finish_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(())
    }

    async fn list_unfinished_tasks(&self) -> Result<Vec<BatchTaskStatus>> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks
            .iter()
            .filter(|t| !t.state.is_finished())
            .cloned()
            .collect())
    }
}

// ----------------------------------------------------------------------------
// Scripted batch processor
// ----------------------------------------------------------------------------

/// What one `run_batch` call does; unscripted calls succeed
#[derive(Debug, Clone, Copy)]
pub(super) enum Step {
    Succeed,
    /// Fails with a connection error (retryable)
    StoreDown,
    /// Fails with an unknown batch (permanent)
    Missing,
    /// Never returns and ignores cancellation
    Hang,
    /// Returns a cancelled result once the token fires
    UntilCancelled,
    /// Returns an interrupted result once the runner shuts down
    UntilInterrupted,
    /// Succeeds after taking this long
    Slow(Duration),
}

#[derive(Default)]
pub(super) struct ScriptedProcessor {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<(BatchId, Instant)>>,
    failed_unfinished: Mutex<Vec<(BatchId, String)>>,
}

impl ScriptedProcessor {
    pub fn script(&self, steps: &[Step]) {
        self.steps.lock().unwrap().extend(steps.iter().copied());
    }

    pub fn calls(&self) -> Vec<(BatchId, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    /// Time between consecutive calls
    pub fn gaps(&self) -> Vec<Duration> {
        self.calls()
            .windows(2)
            .map(|pair| pair[1].1 - pair[0].1)
            .collect()
    }

    pub fn failed_unfinished(&self) -> Vec<(BatchId, String)> {
        self.failed_unfinished.lock().unwrap().clone()
    }
}

fn result_for(batch_id: BatchId) -> ProcessingResult {
    ProcessingResult {
        batch_id,
        succeeded: 2,
        cards_created: 12,
        ..ProcessingResult::default()
    }
}

#[async_trait]
impl BatchProcessor for ScriptedProcessor {
    async fn run_batch(
        &self,
        batch_id: BatchId,
        cancel: &CancellationToken,
        interrupt: &CancellationToken,
    ) -> Result<ProcessingResult> {
        self.calls.lock().unwrap().push((batch_id, Instant::now()));
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Succeed);

        match step {
            Step::Succeed => Ok(result_for(batch_id)),
            Step::StoreDown => Err(DatabaseError::ConnectionFailed("database is locked".into()).into()),
            Step::Missing => Err(BatchError::NotFound { id: batch_id }.into()),
            Step::Hang => std::future::pending().await,
            Step::UntilCancelled => {
                cancel.cancelled().await;
                Ok(ProcessingResult {
                    batch_id,
                    succeeded: 1,
                    failed: 2,
                    cancelled: true,
                    ..ProcessingResult::default()
                })
            }
            Step::UntilInterrupted => {
                interrupt.cancelled().await;
                Ok(ProcessingResult {
                    batch_id,
                    succeeded: 1,
                    interrupted: true,
                    ..ProcessingResult::default()
                })
            }
            Step::Slow(duration) => {
                tokio::time::sleep(duration).await;
                Ok(result_for(batch_id))
            }
        }
    }

    async fn fail_unfinished_documents(&self, batch_id: BatchId, reason: &str) -> Result<usize> {
        self.failed_unfinished
            .lock()
            .unwrap()
            .push((batch_id, reason.to_string()));
        Ok(0)
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

pub(super) struct Setup {
    pub runner: TaskRunner,
    pub store: Arc<MemoryTaskStore>,
    pub processor: Arc<ScriptedProcessor>,
}

pub(super) fn test_config() -> Config {
    let mut config = Config::default();
    config.runner.soft_time_limit = Duration::from_secs(600);
    config.runner.hard_time_limit = Duration::from_secs(900);
    config
}

pub(super) fn setup(config: Config) -> Setup {
    setup_with_store(config, Arc::new(MemoryTaskStore::default()))
}

pub(super) fn setup_with_store(config: Config, store: Arc<MemoryTaskStore>) -> Setup {
    let processor = Arc::new(ScriptedProcessor::default());
    let runner = TaskRunner::new(config, store.clone(), processor.clone());
    Setup {
        runner,
        store,
        processor,
    }
}

/// Poll until the task is finished (the paused clock makes this cheap)
pub(super) async fn wait_finished(runner: &TaskRunner, task_id: TaskId) -> BatchTaskStatus {
    for _ in 0..10_000 {
        let status = runner.get_batch_result(task_id).await.unwrap();
        if status.state.is_finished() {
            return status;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("task {task_id} did not finish");
}

/// Poll until the processor has been called `n` times
pub(super) async fn wait_for_calls(processor: &ScriptedProcessor, n: usize) {
    for _ in 0..10_000 {
        if processor.calls().len() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("processor was not called {n} times");
}
