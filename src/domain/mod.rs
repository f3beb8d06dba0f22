//! Domain types and the ports the pipeline talks to.

pub mod branch;
pub mod clock;
pub mod order;
pub mod ports;
pub mod transaction;
