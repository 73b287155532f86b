mod local;

pub use self::local::LocalFileAccess;
