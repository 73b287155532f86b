pub mod copy_request;
pub mod credential;
pub mod job_description;
pub mod queue;

#[rustfmt::skip]
pub use self::{
    copy_request::{CopyMode, CopyRequest},
    credential::Credential,
    job_description::{JobDescription, StdInKind},
    queue::QueueStatus,
};
