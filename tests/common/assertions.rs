//! Custom assertions and polling helpers

use opendeck_pipeline::{BatchTaskStatus, DocumentStatus, TaskId, TaskRunner};
use std::time::Duration;

/// Poll `get_batch_result` until the task is finished or `timeout` passes
pub async fn wait_for_task(
    runner: &TaskRunner,
    task_id: TaskId,
    timeout: Duration,
) -> BatchTaskStatus {
    let polled = tokio::time::timeout(timeout, async {
        loop {
            let status = runner
                .get_batch_result(task_id)
                .await
                .expect("get_batch_result failed");
            if status.state.is_finished() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    match polled {
        Ok(status) => status,
        Err(_) => panic!("task {task_id} did not finish within {timeout:?}"),
    }
}

/// Assert that a recorded sequence of status writes is a prefix of
/// `UPLOADED, PROCESSING, {COMPLETED | FAILED}` (the initial UPLOADED is
/// implicit since it is written at upload time)
///
/// A never-started document may also go straight from UPLOADED to FAILED.
pub fn assert_status_prefix(writes: &[DocumentStatus]) {
    use DocumentStatus::*;

    let ok = matches!(
        writes,
        [] | [Processing]
            | [Processing, Completed]
            | [Processing, Failed]
            | [Failed]
    );
    assert!(ok, "status writes out of order: {writes:?}");
}
