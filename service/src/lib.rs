pub mod copy;
pub mod registry;
pub mod verify;
pub mod wait;

#[rustfmt::skip]
pub use self::{
    copy::CopyEngine,
    registry::AdaptorRegistry,
};
