/// Wire-level query option flags
///
/// A single flags word travels with every query; the routing layer only
/// interprets `SECONDARY_OK`, the rest pass through to the server.
pub mod options {
    /// Cursor stays open after the first batch is exhausted
    pub const TAILABLE: u32 = 1 << 1;
    /// Caller tolerates being served by a secondary
    pub const SECONDARY_OK: u32 = 1 << 2;
    /// Server should not time the cursor out
    pub const NO_CURSOR_TIMEOUT: u32 = 1 << 4;
    /// Block briefly at the end of a tailable cursor instead of returning empty
    pub const AWAIT_DATA: u32 = 1 << 5;
    /// Stream results in multiple reply batches
    pub const EXHAUST: u32 = 1 << 6;
    /// Accept partial results if some shards are down
    pub const PARTIAL: u32 = 1 << 7;
}

/// Operation kind of a raw wire request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireOp {
    Query,
    GetMore,
    Insert,
    Update,
    Delete,
    KillCursors,
}

/// A raw request forwarded through `call`
///
/// The payload is opaque to the routing layer; only the operation kind and
/// the flags word are inspected to pick a destination.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub op: WireOp,
    pub flags: u32,
    pub payload: Vec<u8>,
}

impl WireRequest {
    pub fn new(op: WireOp, flags: u32, payload: Vec<u8>) -> Self {
        Self { op, flags, payload }
    }

    /// Whether this request may be served by a secondary
    pub fn allows_secondary(&self) -> bool {
        self.op == WireOp::Query && self.flags & options::SECONDARY_OK != 0
    }
}

/// A raw reply returned through `call`
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub flags: u32,
    pub payload: Vec<u8>,
}
