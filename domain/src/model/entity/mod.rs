pub mod copy;
pub mod job;

#[rustfmt::skip]
pub use self::{
    copy::{Copy, CopyState, CopyStatus},
    job::{Job, JobState, JobStatus},
};
