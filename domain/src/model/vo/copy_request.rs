use std::path::PathBuf;

use typed_builder::TypedBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum CopyMode {
    /// Fail if the target already exists.
    Create,
    /// Truncate and overwrite an existing target.
    Replace,
    /// Silently keep an existing target untouched.
    Ignore,
    /// Append the full source to an existing target.
    Append,
    /// Continue an interrupted copy from the target's current size.
    Resume,
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct CopyRequest {
    #[builder(setter(into))]
    pub source: PathBuf,

    #[builder(setter(into))]
    pub target: PathBuf,

    #[builder(default = CopyMode::Create)]
    pub mode: CopyMode,

    /// For `Resume`: byte-compare the target against the head of the source
    /// before continuing.
    #[builder(default)]
    pub verify: bool,

    /// Queue the transfer on the engine worker instead of running inline.
    #[builder(default)]
    pub asynchronous: bool,
}
