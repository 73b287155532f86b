pub mod connection;
pub mod local;
pub mod slurm;
