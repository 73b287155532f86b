mod file_access;
mod scheduler;

#[rustfmt::skip]
pub use self::{
    file_access::{FileAccess, FileAttributes, WriteMode},
    scheduler::{Adaptor, AdaptorCapabilities, Scheduler},
};
