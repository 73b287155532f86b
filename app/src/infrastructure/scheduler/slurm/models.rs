use domain::model::entity::JobState;
use serde::Deserialize;

/// One `sacct -PX` record. Pipe-delimited with a header line; sacct quotes
/// nothing, so the reader must not either.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SacctJob {
    #[serde(rename = "JobID")]
    pub job_id: String,
    #[serde(rename = "JobName")]
    pub job_name: String,
    #[serde(rename = "Partition")]
    pub partition: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "ExitCode")]
    pub exit_code: String,
}

pub const SACCT_FIELDS: &str = "JobID,JobName,Partition,State,ExitCode";

impl SacctJob {
    /// sacct reports a cancelled job as `CANCELLED by <uid>`.
    pub fn job_state(&self) -> JobState {
        match self.state.split_whitespace().next().unwrap_or("") {
            "PENDING" | "REQUEUED" | "RESIZING" | "SUSPENDED" => JobState::Pending,
            "RUNNING" | "COMPLETING" => JobState::Running,
            "COMPLETED" => JobState::Done,
            "CANCELLED" => JobState::Killed,
            "BOOT_FAIL" | "FAILED" | "NODE_FAIL" | "OUT_OF_MEMORY" | "TIMEOUT" | "DEADLINE" => {
                JobState::Error
            }
            _ => JobState::Unknown,
        }
    }

    /// Exit code half of sacct's `code:signal` pair, absent while the job has
    /// not finished.
    pub fn parsed_exit_code(&self) -> Option<i32> {
        if !self.job_state().is_terminal() {
            return None;
        }
        self.exit_code.split(':').next().and_then(|code| code.parse().ok())
    }
}

pub fn parse_sacct(stdout: &str) -> csv::Result<Vec<SacctJob>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .quoting(false)
        .from_reader(stdout.as_bytes());
    reader.deserialize().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn deserialize() {
        let stdout = indoc! {r#"
            JobID|JobName|Partition|State|ExitCode
            4727|render|batch|COMPLETED|0:0
            4728|render|batch|RUNNING|0:0
            4729|render|batch|CANCELLED by 1000|0:0
            "#
        };

        let records = parse_sacct(stdout).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].job_id, "4727");
        assert_eq!(records[0].job_state(), JobState::Done);
        assert_eq!(records[0].parsed_exit_code(), Some(0));
        assert_eq!(records[1].job_state(), JobState::Running);
        assert_eq!(records[1].parsed_exit_code(), None);
        assert_eq!(records[2].job_state(), JobState::Killed);
    }

    #[test]
    fn failure_states_map_to_error() {
        for state in ["FAILED", "TIMEOUT", "OUT_OF_MEMORY", "NODE_FAIL"] {
            let record = SacctJob {
                state: state.to_owned(),
                exit_code: "1:0".to_owned(),
                ..Default::default()
            };
            assert_eq!(record.job_state(), JobState::Error);
            assert_eq!(record.parsed_exit_code(), Some(1));
        }
    }
}
