use std::sync::Arc;

use tokio::sync::Mutex;

use crate::addr::HostAddress;
use crate::conn::BoxedConn;

/// The probe connection slot for one member
///
/// `conn` is `None` when the last connect attempt failed; the next probe
/// retries the dial. The slot's async mutex serializes probes against this
/// member without blocking the monitor's node list.
pub(crate) struct ProbeSlot {
    pub(crate) addr: HostAddress,
    pub(crate) conn: Option<BoxedConn>,
}

pub(crate) type ProbeHandle = Arc<Mutex<ProbeSlot>>;

/// Per-member bookkeeping owned by a set monitor
///
/// The probe connection is used only by the monitor's refresh path, never
/// by user traffic, and lives exactly as long as the monitor does.
pub(crate) struct NodeRecord {
    pub(crate) addr: HostAddress,
    pub(crate) probe: ProbeHandle,
    /// Liveness flag: true on insertion, flipped by health reports and
    /// secondary-failure notifications
    pub(crate) ok: bool,
}

impl NodeRecord {
    pub(crate) fn new(addr: HostAddress, conn: Option<BoxedConn>) -> Self {
        let probe = Arc::new(Mutex::new(ProbeSlot {
            addr: addr.clone(),
            conn,
        }));
        Self {
            addr,
            probe,
            ok: true,
        }
    }
}
