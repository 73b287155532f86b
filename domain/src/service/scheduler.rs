use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::model::entity::{Job, JobStatus};
use crate::model::vo::{Credential, JobDescription, QueueStatus};
use crate::service::FileAccess;

/// One backend endpoint able to run jobs.
///
/// Implementations own all backend resources (processes, transport sessions)
/// and must release them on `close`; for embedded schedulers that includes
/// killing every job still running, since such jobs are online.
#[async_trait::async_trait]
pub trait Scheduler: Send + Sync {
    fn adaptor_name(&self) -> &str;

    fn location(&self) -> &str;

    /// Embedded schedulers run jobs inside this process; their jobs never
    /// outlive the scheduler.
    fn is_embedded(&self) -> bool;

    /// Interval at which waiting callers should re-poll job status.
    fn poll_interval(&self) -> Duration;

    async fn queue_names(&self) -> Result<Vec<String>>;

    async fn default_queue_name(&self) -> Result<String>;

    /// Identifiers of all jobs currently known to the backend.
    async fn jobs(&self) -> Result<Vec<String>>;

    async fn queue_status(&self, queue: &str) -> Result<QueueStatus>;

    async fn queue_statuses(&self, queues: &[String]) -> Result<Vec<QueueStatus>> {
        let mut out = Vec::with_capacity(queues.len());
        for queue in queues {
            out.push(self.queue_status(queue).await?);
        }
        Ok(out)
    }

    async fn submit(&self, description: JobDescription) -> Result<Job>;

    /// Cancels a job and reports its resulting status. Cancelling an already
    /// finished job is not an error.
    async fn cancel(&self, job: &Job) -> Result<JobStatus>;

    async fn status(&self, job: &Job) -> Result<JobStatus>;

    /// One snapshot per input job. Never fails as a whole: a job that cannot
    /// be queried gets its error embedded in the corresponding slot.
    async fn statuses(&self, jobs: &[Job]) -> Vec<JobStatus> {
        let mut out = Vec::with_capacity(jobs.len());
        for job in jobs {
            out.push(match self.status(job).await {
                Ok(status) => status,
                Err(e) => JobStatus::new(&job.id, Default::default(), "UNKNOWN", None, Some(e)),
            });
        }
        out
    }

    async fn close(&self) -> Result<()>;
}

/// Static capability flags one adaptor declares about its schedulers.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptorCapabilities {
    pub supports_batch: bool,
    pub supports_interactive: bool,
    pub is_embedded: bool,
}

/// A pluggable backend variant, selected by name or location scheme.
#[async_trait::async_trait]
pub trait Adaptor: Send + Sync {
    fn name(&self) -> &'static str;

    fn supported_schemes(&self) -> &'static [&'static str];

    fn capabilities(&self) -> AdaptorCapabilities;

    /// Property keys `create_scheduler` recognizes in its property map.
    fn supported_properties(&self) -> &'static [&'static str];

    async fn create_scheduler(
        &self,
        location: &str,
        credential: &Credential,
        properties: &HashMap<String, String>,
    ) -> Result<Arc<dyn Scheduler>>;

    async fn create_file_access(
        &self,
        location: &str,
        credential: &Credential,
    ) -> Result<Arc<dyn FileAccess>>;
}
