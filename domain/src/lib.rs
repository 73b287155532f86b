//! Core model and service traits of the middleware: jobs, copies, the
//! scheduler and file access abstractions, and the shared error type.

pub mod error;
pub mod model;
pub mod service;

pub use self::error::{Error, Result};
