//! Uniform middleware for submitting, monitoring and cancelling compute jobs
//! and for moving file data across heterogeneous back ends: an in-process
//! queue scheduler running real OS processes, and command-line batch systems
//! reached locally or over SSH.

pub mod config;
pub mod infrastructure;

pub use domain::error::{Error, Result};
pub use domain::model::entity::{Copy, CopyState, CopyStatus, Job, JobState, JobStatus};
pub use domain::model::vo::{
    CopyMode, CopyRequest, Credential, JobDescription, QueueStatus, StdInKind,
};
pub use domain::service::{Adaptor, AdaptorCapabilities, FileAccess, Scheduler};
pub use service::copy::CopyEngine;
pub use service::registry::AdaptorRegistry;
pub use service::wait::{wait_until_done, wait_until_running};

use std::sync::Arc;

use self::infrastructure::file::LocalFileAccess;
use self::infrastructure::scheduler::{local::LocalAdaptor, slurm::SlurmAdaptor};

/// Registry with every adaptor this crate ships: `local` and `slurm`.
pub fn default_registry() -> AdaptorRegistry {
    let registry = AdaptorRegistry::new();
    registry.register(Arc::new(LocalAdaptor));
    registry.register(Arc::new(SlurmAdaptor));
    registry
}

/// Copy engine over a local directory tree, outside any registry.
pub fn local_copy_engine(root: impl Into<std::path::PathBuf>, block_size: usize) -> Arc<CopyEngine> {
    CopyEngine::new(Arc::new(LocalFileAccess::new(root)), block_size)
}
