use serde::Serialize;

use crate::error::Error;
use crate::model::vo::job_description::JobDescription;

/// Handle for a submitted job.
///
/// The backend-side job state outlives this handle; dropping it never cancels
/// anything. `online` jobs disappear when the scheduler that submitted them is
/// closed, batch jobs keep running on the backend.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub description: JobDescription,
    pub interactive: bool,
    pub online: bool,
}

impl Job {
    pub fn new(id: impl Into<String>, description: JobDescription, online: bool) -> Self {
        let interactive = description.interactive;
        Self {
            id: id.into(),
            description,
            // Interactive jobs are always online.
            online: online || interactive,
            interactive,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, strum::Display)]
pub enum JobState {
    Pending,
    Running,
    Done,
    Killed,
    Error,
    #[default]
    Unknown,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Killed | JobState::Error)
    }
}

/// Point-in-time snapshot of one job, produced fresh on every poll.
///
/// Failures observed by a background poller are carried in `error` instead of
/// being raised on the worker, so batch status calls must check `has_error`.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    /// Raw state text as reported by the backend, e.g. `COMPLETED` for Slurm.
    pub scheduler_state: String,
    pub exit_code: Option<i32>,
    pub error: Option<Error>,
}

impl JobStatus {
    pub fn new(
        job_id: impl Into<String>,
        state: JobState,
        scheduler_state: impl Into<String>,
        exit_code: Option<i32>,
        error: Option<Error>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            state,
            scheduler_state: scheduler_state.into(),
            exit_code,
            error,
        }
    }

    /// Status for a job this scheduler knows nothing about.
    pub fn unknown(job_id: impl Into<String>) -> Self {
        let job_id = job_id.into();
        let error = Error::NoSuchJob(job_id.clone());
        Self::new(job_id, JobState::Unknown, "UNKNOWN", None, Some(error))
    }

    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }

    pub fn is_done(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}
