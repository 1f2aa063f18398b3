//! # Node Runtime
//!
//! Configuration, subsystem wiring, and the `opx-node` binary.

pub mod config;
pub mod wiring;

pub use config::NodeConfig;
pub use wiring::Node;
