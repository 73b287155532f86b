//! Scheduler backed by Slurm's command line tools, reached directly or over
//! ssh depending on the location. Jobs are batch jobs: they stay under
//! Slurm's control and survive this scheduler being closed.

mod models;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use domain::error::{Error, Result};
use domain::model::entity::{Job, JobState, JobStatus};
use domain::model::vo::{Credential, JobDescription, QueueStatus, StdInKind};
use domain::service::{Adaptor, AdaptorCapabilities, FileAccess, Scheduler};
use indoc::formatdoc;
use regex::Regex;

use self::models::{parse_sacct, SacctJob, SACCT_FIELDS};
use crate::config::{SchedulerConfig, PROP_POLL_INTERVAL};
use crate::infrastructure::file::LocalFileAccess;
use crate::infrastructure::scheduler::connection::SchedulerConnection;

pub const ADAPTOR_NAME: &str = "slurm";
const SCHEMES: &[&str] = &["slurm"];

pub struct SlurmAdaptor;

#[async_trait]
impl Adaptor for SlurmAdaptor {
    fn name(&self) -> &'static str {
        ADAPTOR_NAME
    }

    fn supported_schemes(&self) -> &'static [&'static str] {
        SCHEMES
    }

    fn capabilities(&self) -> AdaptorCapabilities {
        AdaptorCapabilities {
            supports_batch: true,
            supports_interactive: false,
            is_embedded: false,
        }
    }

    fn supported_properties(&self) -> &'static [&'static str] {
        &[PROP_POLL_INTERVAL]
    }

    async fn create_scheduler(
        &self,
        location: &str,
        credential: &Credential,
        properties: &HashMap<String, String>,
    ) -> Result<Arc<dyn Scheduler>> {
        for key in properties.keys() {
            if !self.supported_properties().contains(&key.as_str()) {
                return Err(Error::UnknownProperty(key.clone()));
            }
        }
        let config = SchedulerConfig::from_properties(properties)?;
        let conn = SchedulerConnection::open(SCHEMES, location, credential)?;
        let scheduler = SlurmScheduler::connect(conn, config).await?;
        Ok(scheduler)
    }

    async fn create_file_access(
        &self,
        location: &str,
        credential: &Credential,
    ) -> Result<Arc<dyn FileAccess>> {
        let conn = SchedulerConnection::open(SCHEMES, location, credential)?;
        if conn.is_remote() {
            return Err(Error::Unsupported(
                "file access on a remote slurm location".to_owned(),
            ));
        }
        Ok(Arc::new(LocalFileAccess::new("/")))
    }
}

pub struct SlurmScheduler {
    conn: SchedulerConnection,
    config: SchedulerConfig,
    queues: Vec<String>,
    default_queue: Option<String>,
}

impl SlurmScheduler {
    /// Opens the connection and discovers the partitions once; Slurm
    /// reconfigurations require a new scheduler.
    pub async fn connect(
        conn: SchedulerConnection,
        config: SchedulerConfig,
    ) -> Result<Arc<Self>> {
        let output = conn.run_checked(None, "sinfo", ["-h", "-o", "%P"]).await?;
        let (queues, default_queue) = parse_partitions(&output.stdout);
        tracing::debug!(location = conn.location(), ?queues, "connected to slurm");

        Ok(Arc::new(Self {
            conn,
            config,
            queues,
            default_queue,
        }))
    }

    async fn fetch(&self, job_id: Option<&str>) -> Result<Vec<SacctJob>> {
        // Without -S sacct only accounts for jobs since midnight.
        let since = (chrono::Utc::now() - chrono::Duration::days(30))
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string();
        let mut args = vec!["-PXo", SACCT_FIELDS, "-S", &since];
        if let Some(id) = job_id {
            args.extend(["-j", id]);
        }
        let output = self.conn.run_checked(None, "sacct", args).await?;
        parse_sacct(&output.stdout)
            .map_err(|e| Error::Other(format!("malformed sacct output: {e}")))
    }
}

#[async_trait]
impl Scheduler for SlurmScheduler {
    fn adaptor_name(&self) -> &str {
        ADAPTOR_NAME
    }

    fn location(&self) -> &str {
        self.conn.location()
    }

    fn is_embedded(&self) -> bool {
        false
    }

    fn poll_interval(&self) -> Duration {
        self.config.poll_interval()
    }

    async fn queue_names(&self) -> Result<Vec<String>> {
        Ok(self.queues.clone())
    }

    async fn default_queue_name(&self) -> Result<String> {
        self.default_queue
            .clone()
            .or_else(|| self.queues.first().cloned())
            .ok_or_else(|| Error::NoSuchQueue("this cluster has no partitions".to_owned()))
    }

    async fn jobs(&self) -> Result<Vec<String>> {
        Ok(self.fetch(None).await?.into_iter().map(|record| record.job_id).collect())
    }

    async fn queue_status(&self, queue: &str) -> Result<QueueStatus> {
        service::verify::check_queue_names(&self.queues, [queue])?;

        let output = self
            .conn
            .run_checked(None, "sinfo", ["-h", "-p", queue, "-o", "%a|%l|%D"])
            .await?;
        let mut status = QueueStatus::new(queue);
        if let Some(line) = output.stdout.lines().next() {
            let mut fields = line.trim().split('|');
            for key in ["available", "timelimit", "nodes"] {
                if let Some(value) = fields.next() {
                    status.info.insert(key.to_owned(), value.to_owned());
                }
            }
        }
        Ok(status)
    }

    async fn submit(&self, description: JobDescription) -> Result<Job> {
        service::verify::verify_job_description(&description, false)?;

        let queue = match &description.queue {
            Some(queue) => queue.clone(),
            None => self.default_queue_name().await?,
        };
        service::verify::check_queue_names(&self.queues, [queue.as_str()])?;

        if let Some(dir) = &description.working_directory {
            self.conn.check_directory(&dir.to_string_lossy()).await?;
        }

        let script = build_script(&description, &queue);
        let output = self.conn.run_checked(Some(script.as_bytes()), "sbatch", Vec::<&str>::new()).await?;
        let id = parse_sbatch_output(&output.stdout)?;
        tracing::debug!(job = %id, %queue, "submitted batch job");

        Ok(Job::new(id, description, false))
    }

    async fn cancel(&self, job: &Job) -> Result<JobStatus> {
        self.conn.run_checked(None, "scancel", [job.id.as_str()]).await?;
        // scancel only requests the kill; report whatever sacct sees now.
        self.status(job).await
    }

    async fn status(&self, job: &Job) -> Result<JobStatus> {
        let records = self.fetch(Some(&job.id)).await?;
        match records.into_iter().find(|record| record.job_id == job.id) {
            Some(record) => Ok(JobStatus::new(
                &job.id,
                record.job_state(),
                &record.state,
                record.parsed_exit_code(),
                None,
            )),
            // sacct lags a moment behind sbatch; the job is not gone, just
            // not accounted yet.
            None => Ok(JobStatus::new(&job.id, JobState::Unknown, "UNKNOWN", None, None)),
        }
    }

    async fn close(&self) -> Result<()> {
        // Commands are one ssh hop each; there is no session to tear down,
        // and batch jobs keep running on the cluster.
        Ok(())
    }
}

/// `sinfo -h -o %P` lists one partition per line, the default one marked
/// with a trailing `*`.
fn parse_partitions(stdout: &str) -> (Vec<String>, Option<String>) {
    let mut queues = Vec::new();
    let mut default = None;
    for line in stdout.lines() {
        let name = line.trim();
        if name.is_empty() {
            continue;
        }
        match name.strip_suffix('*') {
            Some(stripped) => {
                default = Some(stripped.to_owned());
                queues.push(stripped.to_owned());
            }
            None => queues.push(name.to_owned()),
        }
    }
    (queues, default)
}

fn parse_sbatch_output(stdout: &str) -> Result<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"Submitted batch job (\d+)").expect("hardcoded pattern")
    });
    re.captures(stdout)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_owned())
        .ok_or_else(|| Error::Other(format!("unrecognized sbatch output: {}", stdout.trim())))
}

fn build_script(description: &JobDescription, queue: &str) -> String {
    let job_name = std::path::Path::new(&description.executable)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "job".to_owned());
    let mut directives = vec![
        format!("#SBATCH --job-name={job_name}"),
        format!("#SBATCH --partition={queue}"),
        format!("#SBATCH --nodes={}", description.node_count),
        format!("#SBATCH --ntasks-per-node={}", description.processes_per_node),
        format!("#SBATCH --time={}", description.max_runtime_minutes),
    ];
    match &description.stdout {
        Some(path) => directives.push(format!("#SBATCH --output={}", path.display())),
        None => directives.push("#SBATCH --output=/dev/null".to_owned()),
    }
    match &description.stderr {
        Some(path) => directives.push(format!("#SBATCH --error={}", path.display())),
        None => directives.push("#SBATCH --error=/dev/null".to_owned()),
    }
    if let Some(dir) = &description.working_directory {
        directives.push(format!("#SBATCH --chdir={}", dir.display()));
    }
    let directives = directives.join("\n");

    // Stable export order keeps resubmissions byte-identical.
    let mut exports: Vec<String> = description
        .environment
        .iter()
        .map(|(key, value)| format!("export {key}={value:?}"))
        .collect();
    exports.sort();
    let exports = exports.join("\n");

    let mut command = description.executable.clone();
    for argument in &description.arguments {
        command.push(' ');
        command.push_str(argument);
    }
    let command = match &description.stdin {
        Some(StdInKind::Text { text }) => {
            format!("{command} << 'GRIDGATE_STDIN'\n{text}\nGRIDGATE_STDIN")
        }
        Some(StdInKind::File { path }) => format!("{command} < {}", path.display()),
        None => command,
    };

    formatdoc! {r#"
        #!/bin/bash
        {directives}
        {exports}
        {command}
    "#}
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn partitions_and_their_default_are_discovered() {
        let (queues, default) = parse_partitions("debug\nbatch*\ngpu\n");
        assert_eq!(queues, ["debug", "batch", "gpu"]);
        assert_eq!(default.as_deref(), Some("batch"));
    }

    #[test]
    fn sbatch_output_yields_the_job_id() {
        let id = parse_sbatch_output("Submitted batch job 4727\n").unwrap();
        assert_eq!(id, "4727");

        assert!(matches!(
            parse_sbatch_output("sbatch: error: invalid partition\n"),
            Err(Error::Other(_))
        ));
    }

    #[test]
    fn script_carries_resources_and_redirections() {
        let description = JobDescription::builder()
            .executable("/opt/app/render")
            .arguments(vec!["--frames".to_owned(), "100".to_owned()])
            .environment(HashMap::from([("OMP_NUM_THREADS".to_owned(), "4".to_owned())]))
            .working_directory("/scratch/render")
            .stdout("/scratch/render/out.txt")
            .node_count(2)
            .processes_per_node(8)
            .max_runtime_minutes(90)
            .build();

        let script = build_script(&description, "batch");
        let expected = indoc! {r#"
            #!/bin/bash
            #SBATCH --job-name=render
            #SBATCH --partition=batch
            #SBATCH --nodes=2
            #SBATCH --ntasks-per-node=8
            #SBATCH --time=90
            #SBATCH --output=/scratch/render/out.txt
            #SBATCH --error=/dev/null
            #SBATCH --chdir=/scratch/render
            export OMP_NUM_THREADS="4"
            /opt/app/render --frames 100
        "#};
        assert_eq!(script, expected);
    }

    #[test]
    fn inline_stdin_becomes_a_here_document() {
        let description = JobDescription::builder()
            .executable("bc")
            .stdin(StdInKind::Text { text: "1+1".to_owned() })
            .build();

        let script = build_script(&description, "batch");
        assert!(script.contains("bc << 'GRIDGATE_STDIN'\n1+1\nGRIDGATE_STDIN"));
    }
}
