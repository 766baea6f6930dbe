// Library root — exposes internals for integration tests and embedders.
// The binary entry point is src/main.rs.

pub mod aggregate;
pub mod bootstrap;
pub mod core;
pub mod gateway;
pub mod upstream;

pub use crate::core::{config, error};
