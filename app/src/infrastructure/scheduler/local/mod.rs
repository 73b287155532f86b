//! Embedded scheduler running jobs as child processes of this agent.
//!
//! Submission only enqueues; a background poller launches jobs in FIFO order
//! per queue, bounded by each queue's concurrency cap, and reaps exited
//! processes. Three queues are offered: `unlimited` (no cap, the default),
//! `multi` (capped at the configured or host parallelism) and `single`
//! (one job at a time).

mod queue;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::error::{Error, Result};
use domain::model::entity::{Job, JobState, JobStatus};
use domain::model::vo::{Credential, JobDescription, QueueStatus};
use domain::service::{Adaptor, AdaptorCapabilities, FileAccess, Scheduler};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use self::queue::{JobQueue, QUEUE_MULTI, QUEUE_SINGLE, QUEUE_UNLIMITED};
use crate::config::SchedulerConfig;
use crate::infrastructure::file::LocalFileAccess;
use crate::infrastructure::process::{self, ProcessHandle};

pub const ADAPTOR_NAME: &str = "local";
const LOCATION: &str = "local://";

pub struct LocalAdaptor;

#[async_trait]
impl Adaptor for LocalAdaptor {
    fn name(&self) -> &'static str {
        ADAPTOR_NAME
    }

    fn supported_schemes(&self) -> &'static [&'static str] {
        &["local"]
    }

    fn capabilities(&self) -> AdaptorCapabilities {
        AdaptorCapabilities {
            supports_batch: true,
            supports_interactive: false,
            is_embedded: true,
        }
    }

    fn supported_properties(&self) -> &'static [&'static str] {
        SchedulerConfig::SUPPORTED_PROPERTIES
    }

    async fn create_scheduler(
        &self,
        location: &str,
        _credential: &Credential,
        properties: &HashMap<String, String>,
    ) -> Result<Arc<dyn Scheduler>> {
        check_location(location)?;
        let config = SchedulerConfig::from_properties(properties)?;
        Ok(LocalScheduler::new(config))
    }

    async fn create_file_access(
        &self,
        location: &str,
        _credential: &Credential,
    ) -> Result<Arc<dyn FileAccess>> {
        check_location(location)?;
        Ok(Arc::new(LocalFileAccess::new("/")))
    }
}

fn check_location(location: &str) -> Result<()> {
    if location.is_empty() || location == LOCATION || location == "/" {
        Ok(())
    } else {
        Err(Error::InvalidLocation {
            location: location.to_owned(),
            reason: format!("the local adaptor only accepts {LOCATION:?}"),
        })
    }
}

struct LocalJob {
    job: Job,
    state: JobState,
    exit_code: Option<i32>,
    error: Option<Error>,
    handle: Option<ProcessHandle>,
    queue: String,
}

struct LocalState {
    queues: HashMap<String, JobQueue>,
    jobs: HashMap<String, LocalJob>,
    /// Terminal job ids, oldest first. Once it outgrows `history_size` the
    /// oldest entries are forgotten entirely.
    history: VecDeque<String>,
    history_size: usize,
    next_id: u64,
    closed: bool,
}

pub struct LocalScheduler {
    config: SchedulerConfig,
    state: Arc<Mutex<LocalState>>,
    notify: Arc<Notify>,
    shutdown: CancellationToken,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl LocalScheduler {
    pub fn new(config: SchedulerConfig) -> Arc<Self> {
        let mut queues = HashMap::new();
        queues.insert(QUEUE_UNLIMITED.to_owned(), JobQueue::new(QUEUE_UNLIMITED, None));
        queues.insert(
            QUEUE_MULTI.to_owned(),
            JobQueue::new(QUEUE_MULTI, Some(config.effective_max_concurrent())),
        );
        queues.insert(QUEUE_SINGLE.to_owned(), JobQueue::new(QUEUE_SINGLE, Some(1)));

        let state = Arc::new(Mutex::new(LocalState {
            queues,
            jobs: HashMap::new(),
            history: VecDeque::new(),
            history_size: config.history_size,
            next_id: 1,
            closed: false,
        }));
        let notify = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();
        let poller = tokio::spawn(run_poller(
            state.clone(),
            notify.clone(),
            shutdown.clone(),
            config.poll_interval(),
        ));

        Arc::new(Self {
            config,
            state,
            notify,
            shutdown,
            poller: Mutex::new(Some(poller)),
        })
    }
}

#[async_trait]
impl Scheduler for LocalScheduler {
    fn adaptor_name(&self) -> &str {
        ADAPTOR_NAME
    }

    fn location(&self) -> &str {
        LOCATION
    }

    fn is_embedded(&self) -> bool {
        true
    }

    fn poll_interval(&self) -> Duration {
        self.config.poll_interval()
    }

    async fn queue_names(&self) -> Result<Vec<String>> {
        Ok(vec![
            QUEUE_UNLIMITED.to_owned(),
            QUEUE_MULTI.to_owned(),
            QUEUE_SINGLE.to_owned(),
        ])
    }

    async fn default_queue_name(&self) -> Result<String> {
        Ok(QUEUE_UNLIMITED.to_owned())
    }

    async fn jobs(&self) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state.jobs.keys().cloned().collect())
    }

    async fn queue_status(&self, queue: &str) -> Result<QueueStatus> {
        let state = self.state.lock().await;
        let queue = state
            .queues
            .get(queue)
            .ok_or_else(|| Error::NoSuchQueue(queue.to_owned()))?;

        let mut status = QueueStatus::new(queue.name());
        let cap = queue
            .max_concurrent()
            .map_or_else(|| "unlimited".to_owned(), |max| max.to_string());
        status.info.insert("max.concurrent".to_owned(), cap);
        status
            .info
            .insert("pending".to_owned(), queue.pending_count().to_string());
        status
            .info
            .insert("running".to_owned(), queue.running_count().to_string());
        Ok(status)
    }

    async fn submit(&self, description: JobDescription) -> Result<Job> {
        service::verify::verify_job_description(&description, false)?;

        let mut state = self.state.lock().await;
        if state.closed {
            return Err(Error::NotConnected("scheduler is closed".to_owned()));
        }

        let queue_name = description.queue.clone().unwrap_or_else(|| QUEUE_UNLIMITED.to_owned());
        if !state.queues.contains_key(&queue_name) {
            return Err(Error::NoSuchQueue(queue_name));
        }

        let id = format!("local-{}", state.next_id);
        state.next_id += 1;

        let job = Job::new(&id, description, true);
        state.jobs.insert(
            id.clone(),
            LocalJob {
                job: job.clone(),
                state: JobState::Pending,
                exit_code: None,
                error: None,
                handle: None,
                queue: queue_name.clone(),
            },
        );
        if let Some(queue) = state.queues.get_mut(&queue_name) {
            queue.enqueue(id);
        }
        drop(state);

        self.notify.notify_one();
        Ok(job)
    }

    async fn cancel(&self, job: &Job) -> Result<JobStatus> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let (current, queue_name) = match state.jobs.get(&job.id) {
            Some(local) => (local.state, local.queue.clone()),
            None => return Err(Error::NoSuchJob(job.id.clone())),
        };

        match current {
            JobState::Pending => {
                if let Some(queue) = state.queues.get_mut(&queue_name) {
                    queue.remove_pending(&job.id);
                }
                finish(state, &job.id, JobState::Killed, None, None);
            }
            JobState::Running => {
                let handle = state.jobs.get_mut(&job.id).and_then(|local| local.handle.take());
                if let Some(mut handle) = handle {
                    if let Err(e) = handle.kill().await {
                        tracing::warn!(job = %job.id, error = %e, "failed to kill job process");
                    }
                }
                finish(state, &job.id, JobState::Killed, None, None);
            }
            // Already terminal, report as-is.
            _ => {}
        }

        let status = state
            .jobs
            .get(&job.id)
            .map(snapshot)
            .unwrap_or_else(|| JobStatus::new(&job.id, JobState::Killed, "KILLED", None, None));
        drop(guard);

        // A freed slot may unblock the next pending job.
        self.notify.notify_one();
        Ok(status)
    }

    async fn status(&self, job: &Job) -> Result<JobStatus> {
        let state = self.state.lock().await;
        state
            .jobs
            .get(&job.id)
            .map(snapshot)
            .ok_or_else(|| Error::NoSuchJob(job.id.clone()))
    }

    async fn close(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Ok(());
            }
            state.closed = true;
        }

        self.shutdown.cancel();
        self.notify.notify_one();

        let poller = self.poller.lock().await.take();
        if let Some(poller) = poller {
            let _ = poller.await;
        }
        Ok(())
    }
}

fn snapshot(local: &LocalJob) -> JobStatus {
    JobStatus::new(
        &local.job.id,
        local.state,
        local.state.to_string().to_uppercase(),
        local.exit_code,
        local.error.clone(),
    )
}

/// Moves a job to a terminal state, frees its queue slot and archives it,
/// evicting the oldest terminal jobs past the history cap.
fn finish(
    state: &mut LocalState,
    id: &str,
    terminal: JobState,
    exit_code: Option<i32>,
    error: Option<Error>,
) {
    let queue_name = match state.jobs.get_mut(id) {
        Some(local) => {
            local.state = terminal;
            local.exit_code = exit_code;
            local.error = error;
            local.handle = None;
            local.queue.clone()
        }
        None => return,
    };

    if let Some(queue) = state.queues.get_mut(&queue_name) {
        queue.release(id);
    }

    state.history.push_back(id.to_owned());
    while state.history.len() > state.history_size {
        if let Some(evicted) = state.history.pop_front() {
            state.jobs.remove(&evicted);
        }
    }
}

async fn run_poller(
    state: Arc<Mutex<LocalState>>,
    notify: Arc<Notify>,
    shutdown: CancellationToken,
    interval: Duration,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = notify.notified() => {}
            _ = tokio::time::sleep(interval) => {}
        }
        advance(&state).await;
    }

    // Jobs here are online: they die with the scheduler.
    let mut guard = state.lock().await;
    let state = &mut *guard;
    let open: Vec<String> = state
        .jobs
        .iter()
        .filter(|(_, local)| !local.state.is_terminal())
        .map(|(id, _)| id.clone())
        .collect();
    for id in open {
        let handle = state.jobs.get_mut(&id).and_then(|local| local.handle.take());
        if let Some(mut handle) = handle {
            if let Err(e) = handle.kill().await {
                tracing::warn!(job = %id, error = %e, "failed to kill job process at shutdown");
            }
        }
        if let Some(queue) = state
            .jobs
            .get(&id)
            .map(|local| local.queue.clone())
            .and_then(|name| state.queues.get_mut(&name))
        {
            queue.remove_pending(&id);
            queue.release(&id);
        }
        if let Some(local) = state.jobs.get_mut(&id) {
            local.state = JobState::Killed;
        }
    }
}

/// One scheduling round: reap exited processes, then start every pending job
/// its queue has a free slot for.
async fn advance(state: &Mutex<LocalState>) {
    let mut guard = state.lock().await;
    let state = &mut *guard;

    let running: Vec<String> = state
        .jobs
        .iter()
        .filter(|(_, local)| local.state == JobState::Running)
        .map(|(id, _)| id.clone())
        .collect();
    for id in running {
        let observed = match state.jobs.get_mut(&id).and_then(|local| local.handle.as_mut()) {
            Some(handle) => handle.try_exit_code(),
            None => continue,
        };
        match observed {
            Ok(None) => {}
            Ok(Some(exit_code)) => {
                tracing::debug!(job = %id, exit_code, "job process exited");
                finish(state, &id, JobState::Done, Some(exit_code), None);
            }
            Err(e) => finish(state, &id, JobState::Error, None, Some(e)),
        }
    }

    let queue_names: Vec<String> = state.queues.keys().cloned().collect();
    for name in queue_names {
        loop {
            let Some(id) = state.queues.get_mut(&name).and_then(JobQueue::next_eligible) else {
                break;
            };
            let description = match state.jobs.get(&id) {
                Some(local) => local.job.description.clone(),
                None => continue,
            };
            match process::launch(&description).await {
                Ok(handle) => {
                    tracing::debug!(job = %id, pid = handle.pid(), "job process started");
                    if let Some(local) = state.jobs.get_mut(&id) {
                        local.state = JobState::Running;
                        local.handle = Some(handle);
                    }
                }
                Err(e) => finish(state, &id, JobState::Error, None, Some(e)),
            }
        }
    }
}
