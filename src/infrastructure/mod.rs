//! Adapters for the ports in [`crate::domain::ports`].

pub mod business_central;
pub mod in_memory;
pub mod local_fs;
pub mod smtp;
pub mod spool_queue;
