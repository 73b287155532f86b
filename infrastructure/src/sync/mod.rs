mod latch;
pub mod timer;

pub use self::latch::Latch;
