//! Common infrastructure for vxfabric control-plane daemons.
//!
//! This crate provides the shared functionality used by the fabric
//! controller daemon:
//!
//! - [`shell`]: Safe shell command execution with proper quoting and a
//!   timeout-bounded variant for control-channel I/O
//! - [`config`]: Daemon configuration loading and validation
//! - [`error`]: Error types for fabric operations
//!
//! # Architecture
//!
//! The fabric controller reacts to switch lifecycle events and converges
//! device state by driving each switch's OVSDB endpoint through
//! `ovs-vsctl`. Everything here is transport plumbing; the switch
//! registry and mesh reconciliation live in the daemon crate.

pub mod config;
pub mod error;
pub mod shell;

// Re-export commonly used items at crate root
pub use config::FabricConfig;
pub use error::{FabricError, FabricResult};
