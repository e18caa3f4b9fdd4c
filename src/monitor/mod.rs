//! Replica set topology tracking
//!
//! This module provides:
//! - Per-set topology monitoring over dedicated probe connections
//! - Primary discovery with a two-pass sweep and a peer-hint shortcut
//! - Random live-secondary selection for read load
//! - A process-wide registry with a lazily-launched background sweeper

mod node;
mod registry;
mod set;
mod sweeper;

pub use registry::MonitorRegistry;
pub use set::{ChangeHook, MonitorError, SetMonitor};
