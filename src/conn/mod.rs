//! Collaborator seam: the single-host connection surface the core routes
//! over, plus the document and wire-level types read by the probe paths.

pub mod reply;
mod traits;
mod wire;

pub use reply::{IsMasterReply, MemberStatus, StatusReply};
pub use traits::{BoxedConn, Connection, ConnectionError, Connector, Cursor, QueryParams};
pub use wire::{options, WireOp, WireRequest, WireResponse};

/// Self-describing document tree exchanged with the cluster
pub type Document = serde_json::Value;
