use domain::error::{Error, Result};
use domain::model::vo::JobDescription;

/// Checks the constraints every scheduler imposes on a description before it
/// accepts the job. Shared by the local scheduler and the batch connections;
/// batch connections pass `allow_interactive = false`.
pub fn verify_job_description(description: &JobDescription, allow_interactive: bool) -> Result<()> {
    if description.executable.trim().is_empty() {
        return Err(Error::IncompleteJobDescription(
            "executable is required".to_owned(),
        ));
    }

    if description.node_count < 1 {
        return Err(Error::InvalidJobDescription(format!(
            "node count must be at least 1, got {}",
            description.node_count
        )));
    }

    if description.processes_per_node < 1 {
        return Err(Error::InvalidJobDescription(format!(
            "processes per node must be at least 1, got {}",
            description.processes_per_node
        )));
    }

    if description.max_runtime_minutes < 1 {
        return Err(Error::InvalidJobDescription(format!(
            "maximum runtime must be at least 1 minute, got {}",
            description.max_runtime_minutes
        )));
    }

    if description.interactive && !allow_interactive {
        return Err(Error::InvalidJobDescription(
            "interactive jobs are not supported by this scheduler".to_owned(),
        ));
    }

    Ok(())
}

/// Fails with `NoSuchQueue` naming every requested queue the backend does not
/// know about.
pub fn check_queue_names<'a, I>(known: &[String], requested: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let unknown: Vec<&str> = requested
        .into_iter()
        .filter(|name| !known.iter().any(|k| k == name))
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(Error::NoSuchQueue(unknown.join(", ")))
    }
}
