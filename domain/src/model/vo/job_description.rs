use std::collections::HashMap;
use std::path::PathBuf;

use typed_builder::TypedBuilder;

/// What to run and how. Immutable once submitted.
///
/// Constraints (checked at submission, not construction): `executable` must be
/// non-empty, `node_count` and `processes_per_node` at least 1,
/// `max_runtime_minutes` at least 1.
#[derive(Debug, Clone, TypedBuilder)]
pub struct JobDescription {
    #[builder(setter(into))]
    pub executable: String,

    #[builder(default)]
    pub arguments: Vec<String>,

    #[builder(default)]
    pub environment: HashMap<String, String>,

    #[builder(default, setter(strip_option, into))]
    pub working_directory: Option<PathBuf>,

    #[builder(default, setter(strip_option))]
    pub stdin: Option<StdInKind>,

    #[builder(default, setter(strip_option, into))]
    pub stdout: Option<PathBuf>,

    #[builder(default, setter(strip_option, into))]
    pub stderr: Option<PathBuf>,

    /// Target queue; the scheduler's default queue when unset.
    #[builder(default, setter(strip_option, into))]
    pub queue: Option<String>,

    #[builder(default = 1)]
    pub node_count: u32,

    #[builder(default = 1)]
    pub processes_per_node: u32,

    #[builder(default = 15)]
    pub max_runtime_minutes: u64,

    #[builder(default)]
    pub interactive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdInKind {
    Text { text: String },
    File { path: PathBuf },
}
