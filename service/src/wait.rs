use std::ops::ControlFlow;
use std::time::Duration;

use domain::model::entity::{Job, JobState, JobStatus};
use domain::service::Scheduler;
use infrastructure::sync::timer;

/// Polls the scheduler until the job reaches a terminal state or `timeout`
/// elapses. A zero timeout means no deadline. The job is polled at least once,
/// and the last observed status is returned even when the deadline expires.
pub async fn wait_until_done(scheduler: &dyn Scheduler, job: &Job, timeout: Duration) -> JobStatus {
    wait_until(scheduler, job, timeout, |status| status.is_done()).await
}

/// Like [`wait_until_done`], but also returns as soon as the job starts
/// running. Jobs may finish between two polls, so a terminal state satisfies
/// the wait as well.
pub async fn wait_until_running(
    scheduler: &dyn Scheduler,
    job: &Job,
    timeout: Duration,
) -> JobStatus {
    wait_until(scheduler, job, timeout, |status| {
        status.is_running() || status.is_done()
    })
    .await
}

async fn wait_until<F>(
    scheduler: &dyn Scheduler,
    job: &Job,
    timeout: Duration,
    reached: F,
) -> JobStatus
where
    F: Fn(&JobStatus) -> bool,
{
    let reached = &reached;
    timer::poll_deadline(scheduler.poll_interval(), timeout, move || async move {
        let status = match scheduler.status(job).await {
            Ok(status) => status,
            Err(e) => JobStatus::new(&job.id, JobState::Unknown, "UNKNOWN", None, Some(e)),
        };

        if reached(&status) || status.has_error() {
            ControlFlow::Break(status)
        } else {
            ControlFlow::Continue(status)
        }
    })
    .await
}
