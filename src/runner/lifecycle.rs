//! Startup, dispatch and shutdown.

use crate::error::Result;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::{ActiveBatch, QueuedTask, TaskRunner};
use tokio_util::sync::CancellationToken;

/// How often shutdown re-checks the set of executing batches
const ACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl TaskRunner {
    /// Restore unfinished tasks and spawn the dispatcher
    ///
    /// Tasks left PENDING or RUNNING by a previous process are queued again
    /// ahead of anything enqueued since. A task that was interrupted during
    /// attempt N resumes with attempt N; the interrupted run does not count
    /// as a failure.
    pub async fn start(&self) -> Result<tokio::task::JoinHandle<()>> {
        let unfinished = self.tasks.list_unfinished_tasks().await?;

        let restored = {
            let mut queue = self.state.queue.lock().await;
            let mut restored = 0;
            for task in unfinished.into_iter().rev() {
                if queue.iter().any(|queued| queued.task_id == task.task_id) {
                    continue;
                }
                queue.push_front(QueuedTask {
                    task_id: task.task_id,
                    batch_id: task.batch_id,
                    first_attempt: task.attempts.max(1),
                });
                restored += 1;
            }
            restored
        };

        if restored > 0 {
            tracing::info!(restored, "restored unfinished batch tasks");
            self.state.queue_notify.notify_one();
        }

        Ok(self.spawn_dispatcher())
    }

    /// Stop accepting batches, interrupt the active ones and wait for them
    ///
    /// An active batch finishes the document it is on and stops; its
    /// remaining documents keep their status and its task stays RUNNING.
    /// Batches still queued stay PENDING. Both are picked up by the next
    /// [`start`](Self::start). Waits at most `runner.shutdown_grace_period`.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("initiating task runner shutdown");

        self.state.accepting_new.store(false, Ordering::SeqCst);
        self.state.shutdown_token.cancel();

        let grace = self.config.runner.shutdown_grace_period;
        match tokio::time::timeout(grace, self.wait_for_active_batches()).await {
            Ok(()) => tracing::info!("all active batches stopped"),
            Err(_) => tracing::warn!(
                grace_secs = grace.as_secs(),
                "timeout waiting for active batches, proceeding with shutdown"
            ),
        }

        tracing::info!("task runner shutdown complete");
        Ok(())
    }

    async fn wait_for_active_batches(&self) {
        loop {
            let active_count = self.active_count().await;
            if active_count == 0 {
                return;
            }
            tracing::debug!(active_count, "waiting for active batches to stop");
            tokio::time::sleep(ACTIVE_POLL_INTERVAL).await;
        }
    }

    /// Pop queued tasks and hand each one to a worker once a permit is free
    fn spawn_dispatcher(&self) -> tokio::task::JoinHandle<()> {
        let runner = self.clone();

        tokio::spawn(async move {
            let shutdown = runner.state.shutdown_token.clone();

            loop {
                let next = runner.state.queue.lock().await.pop_front();

                let Some(task) = next else {
                    tokio::select! {
                        _ = runner.state.queue_notify.notified() => {}
                        _ = shutdown.cancelled() => break,
                    }
                    continue;
                };

                // Registered before waiting for a permit so cancel_batch can reach it.
                // Not a child of the shutdown token: shutdown interrupts, it does not cancel.
                let token = CancellationToken::new();
                runner.state.active_batches.lock().await.insert(
                    task.task_id,
                    ActiveBatch {
                        batch_id: task.batch_id,
                        cancel: token.clone(),
                    },
                );

                let permit = tokio::select! {
                    permit = runner.state.concurrent_limit.clone().acquire_owned() => permit.ok(),
                    _ = shutdown.cancelled() => None,
                };
                let Some(permit) = permit else {
                    // Leave it for the next start; the database still has it
                    runner.state.active_batches.lock().await.remove(&task.task_id);
                    runner.state.queue.lock().await.push_front(task);
                    break;
                };

                let worker = runner.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    worker.execute_task(task, token).await;
                    worker.state.active_batches.lock().await.remove(&task.task_id);
                });
            }

            tracing::debug!("dispatcher stopped");
        })
    }
}
