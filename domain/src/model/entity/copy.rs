use crate::error::Error;

/// Handle for a copy request accepted by a copy engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Copy {
    pub id: String,
}

impl Copy {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum CopyState {
    Pending,
    Running,
    Done,
}

/// Snapshot of one transfer; `bytes_copied` advances while the copy runs.
///
/// A cancelled or failed copy still reports `Done` with the failure in
/// `error`, mirroring the job status pattern.
#[derive(Debug, Clone)]
pub struct CopyStatus {
    pub copy: Copy,
    pub state: CopyState,
    pub bytes_to_copy: u64,
    pub bytes_copied: u64,
    pub error: Option<Error>,
}

impl CopyStatus {
    pub fn is_running(&self) -> bool {
        self.state == CopyState::Running
    }

    pub fn is_done(&self) -> bool {
        self.state == CopyState::Done
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}
