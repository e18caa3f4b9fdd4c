use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng as _;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::addr::HostAddress;
use crate::config::MonitorConfig;
use crate::conn::{BoxedConn, Connector, IsMasterReply, StatusReply};

use super::node::{NodeRecord, ProbeHandle};

/// Callback invoked when a discovery pass grows the membership list
pub type ChangeHook = Arc<dyn Fn(&SetMonitor) + Send + Sync>;

/// Failures the monitor surfaces to callers
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("no primary found for set: {0}")]
    NoPrimaryFound(String),
    #[error("no member available to serve reads in set: {0}")]
    SecondaryUnavailable(String),
    #[error("membership change hook already installed")]
    HookAlreadyInstalled,
}

/// Shared, background-refreshed topology cache for one named replica set
///
/// Owns a probe connection per known member and runs the primary-discovery
/// state machine. The node list only ever grows; the master index is `-1`
/// while the primary is unknown. Shared across callers via `Arc`; the node
/// lock is never held across probe I/O.
pub struct SetMonitor {
    name: String,
    connector: Arc<dyn Connector>,
    config: MonitorConfig,
    nodes: Mutex<Vec<NodeRecord>>,
    /// Index of the believed primary, -1 when unknown. Read optimistically
    /// without the node lock and rechecked under it before mutation.
    master: AtomicIsize,
    hook: Mutex<Option<ChangeHook>>,
}

impl SetMonitor {
    /// Seed the monitor from a list of candidate members.
    ///
    /// Seeds that fail to connect are skipped. Each seeded member gets one
    /// probe; seeding stops early once a seed reports itself primary (the
    /// rest of the set arrives through the `hosts` merge). The returned
    /// monitor may not know the primary yet.
    pub async fn new(
        name: &str,
        seeds: &[HostAddress],
        connector: Arc<dyn Connector>,
        config: MonitorConfig,
        hook: Option<ChangeHook>,
    ) -> Self {
        let monitor = Self {
            name: name.to_string(),
            connector,
            config,
            nodes: Mutex::new(Vec::new()),
            master: AtomicIsize::new(-1),
            hook: Mutex::new(hook),
        };

        for seed in seeds {
            if monitor.find(seed).is_some() {
                continue;
            }
            let conn = match monitor
                .connector
                .connect(seed, monitor.config.connect_timeout())
                .await
            {
                Ok(conn) => conn,
                Err(error) => {
                    debug!(set = %monitor.name, seed = %seed, %error, "skipping unreachable seed");
                    continue;
                }
            };

            let probe = {
                let mut nodes = monitor.nodes.lock();
                let record = NodeRecord::new(seed.clone(), Some(conn));
                let probe = record.probe.clone();
                nodes.push(record);
                probe
            };

            let (is_primary, _) = monitor.check_connection(&probe, false).await;
            if is_primary {
                break;
            }
        }

        monitor
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the currently known member addresses
    pub fn members(&self) -> Vec<HostAddress> {
        self.nodes.lock().iter().map(|n| n.addr.clone()).collect()
    }

    /// Canonical `name/host1:port1,host2:port2,...` form
    pub fn server_address(&self) -> String {
        let members = self
            .nodes
            .lock()
            .iter()
            .map(|n| n.addr.to_string())
            .collect::<Vec<_>>()
            .join(",");
        if self.name.is_empty() {
            members
        } else {
            format!("{}/{}", self.name, members)
        }
    }

    /// Address of the current primary, running discovery first if the
    /// believed primary is unknown or marked down.
    pub async fn get_primary(&self) -> Result<HostAddress, MonitorError> {
        if !self.primary_believed_healthy() {
            self.discover_primary().await;
        }

        let master = self.master.load(Ordering::SeqCst);
        if master < 0 {
            return Err(MonitorError::NoPrimaryFound(self.name.clone()));
        }
        self.nodes
            .lock()
            .get(master as usize)
            .map(|n| n.addr.clone())
            .ok_or_else(|| MonitorError::NoPrimaryFound(self.name.clone()))
    }

    /// Pick a member for read load: scan circularly from a random offset
    /// and return the first live non-primary. Falls back to the first
    /// member when nothing else qualifies.
    pub fn get_secondary(&self) -> Result<HostAddress, MonitorError> {
        let nodes = self.nodes.lock();
        if nodes.is_empty() {
            return Err(MonitorError::SecondaryUnavailable(self.name.clone()));
        }

        let master = self.master.load(Ordering::SeqCst);
        let start = rand::thread_rng().gen_range(0..nodes.len());
        for i in 0..nodes.len() {
            let p = (start + i) % nodes.len();
            if p as isize == master {
                continue;
            }
            if nodes[p].ok {
                return Ok(nodes[p].addr.clone());
            }
        }

        Ok(nodes[0].addr.clone())
    }

    /// Forget the believed primary if it matches `addr`
    pub fn notify_primary_failure(&self, addr: &HostAddress) {
        if self.master.load(Ordering::SeqCst) >= 0 {
            let nodes = self.nodes.lock();
            let master = self.master.load(Ordering::SeqCst);
            if master >= 0 && nodes.get(master as usize).map(|n| &n.addr) == Some(addr) {
                self.master.store(-1, Ordering::SeqCst);
            }
        }
    }

    /// Mark a member down for read selection
    pub fn notify_secondary_failure(&self, addr: &HostAddress) {
        let mut nodes = self.nodes.lock();
        if let Some(node) = nodes.iter_mut().find(|n| &n.addr == addr) {
            node.ok = false;
        }
    }

    /// Install the membership-change notification callback.
    /// Installing a second hook is an error.
    pub fn set_change_hook(&self, hook: ChangeHook) -> Result<(), MonitorError> {
        let mut slot = self.hook.lock();
        if slot.is_some() {
            return Err(MonitorError::HookAlreadyInstalled);
        }
        *slot = Some(hook);
        Ok(())
    }

    /// Confirm the believed primary is still primary, falling back to full
    /// discovery when it is not (or none is believed).
    pub async fn check(&self) {
        let master = self.master.load(Ordering::SeqCst);
        if master >= 0 {
            let probe = self
                .nodes
                .lock()
                .get(master as usize)
                .map(|n| n.probe.clone());
            if let Some(probe) = probe {
                let (is_primary, _) = self.check_connection(&probe, false).await;
                if is_primary {
                    return;
                }
            }
        }

        self.discover_primary().await;
    }

    /// Two-pass sweep over all known members looking for the primary, with
    /// a single hint shortcut per invocation and a pause between passes.
    /// Leaves the master index untouched when no member claims primary.
    async fn discover_primary(&self) {
        let mut tried_hint = false;
        debug!(set = %self.name, members = %self.server_address(), "running primary discovery");

        for pass in 0..2 {
            let verbose = pass > 0;
            let mut i = 0;
            // the list may grow mid-pass as hosts merge in; iterate by index
            while let Some(probe) = self.probe_at(i) {
                let (is_primary, hint) = self.check_connection(&probe, verbose).await;
                if is_primary {
                    self.master.store(i as isize, Ordering::SeqCst);
                    return;
                }

                if !tried_hint {
                    if let Some(hinted) = hint.and_then(|h| h.parse::<HostAddress>().ok()) {
                        if let Some(x) = self.find(&hinted) {
                            tried_hint = true;
                            if let Some(probe) = self.probe_at(x) {
                                let (is_primary, _) = self.check_connection(&probe, false).await;
                                if is_primary {
                                    self.master.store(x as isize, Ordering::SeqCst);
                                    return;
                                }
                            }
                        }
                    }
                }

                i += 1;
            }

            if pass == 0 {
                tokio::time::sleep(self.config.retry_pause()).await;
            }
        }
    }

    /// One probe of one member: identify it, merge any members it
    /// advertises, then refresh liveness from its status report. Every
    /// collaborator failure collapses to `(false, None)`.
    async fn check_connection(&self, probe: &ProbeHandle, verbose: bool) -> (bool, Option<String>) {
        let mut slot = probe.lock().await;

        if slot.conn.is_none() {
            match self
                .connector
                .connect(&slot.addr, self.config.connect_timeout())
                .await
            {
                Ok(conn) => slot.conn = Some(conn),
                Err(error) => {
                    debug!(set = %self.name, member = %slot.addr, %error, "probe connect failed");
                    return (false, None);
                }
            }
        }

        let probed = match slot.conn.as_mut() {
            Some(conn) => conn.is_master().await,
            None => return (false, None),
        };
        let (is_primary, reply) = match probed {
            Ok(result) => result,
            Err(error) => {
                // drop the connection so the next probe re-dials; the ok
                // flag is only touched by status reports
                if verbose {
                    info!(set = %self.name, member = %slot.addr, %error, "probe failed");
                } else {
                    debug!(set = %self.name, member = %slot.addr, %error, "probe failed");
                }
                slot.conn = None;
                return (false, None);
            }
        };

        if verbose {
            info!(set = %self.name, member = %slot.addr, primary = is_primary, "probe reply");
        } else {
            debug!(set = %self.name, member = %slot.addr, primary = is_primary, "probe reply");
        }

        let view = IsMasterReply::from_document(reply);
        let mut hint = None;
        let mut changed = false;
        if !view.hosts.is_empty() {
            hint = view.primary.clone();
            changed |= self.merge_hosts(&view.hosts).await;
        }
        if !view.passives.is_empty() {
            changed |= self.merge_hosts(&view.passives).await;
        }

        if let Some(conn) = slot.conn.as_mut() {
            self.refresh_status(conn).await;
        }
        drop(slot);

        if changed {
            let hook = self.hook.lock().clone();
            if let Some(hook) = hook {
                hook(self);
            }
        }

        (is_primary, hint)
    }

    /// Append records for advertised members we have not seen before.
    /// A failed dial still gets a record; its probe retries later.
    /// Returns whether anything was added.
    async fn merge_hosts(&self, hosts: &[String]) -> bool {
        let mut added = false;
        for host in hosts {
            let addr = match host.parse::<HostAddress>() {
                Ok(addr) => addr,
                Err(error) => {
                    warn!(set = %self.name, member = %host, %error, "ignoring unparsable member address");
                    continue;
                }
            };
            if self.find(&addr).is_some() {
                continue;
            }

            let conn = match self
                .connector
                .connect(&addr, self.config.connect_timeout())
                .await
            {
                Ok(conn) => Some(conn),
                Err(error) => {
                    debug!(set = %self.name, member = %addr, %error, "new member not reachable yet");
                    None
                }
            };

            let inserted = {
                let mut nodes = self.nodes.lock();
                if nodes.iter().any(|n| n.addr == addr) {
                    false
                } else {
                    nodes.push(NodeRecord::new(addr, conn));
                    true
                }
            };
            if inserted {
                info!(set = %self.name, members = %self.server_address(), "replica set membership updated");
                added = true;
            }
        }
        added
    }

    /// Ask one member for the set-wide status report and refresh the
    /// liveness flag of every member it names. Unknown members are left
    /// for the next hosts merge; a failed command changes nothing.
    async fn refresh_status(&self, conn: &mut BoxedConn) {
        let status = match conn.run_command("admin", json!({ "replSetGetStatus": 1 })).await {
            Ok(doc) => StatusReply::from_document(doc),
            Err(error) => {
                debug!(set = %self.name, %error, "status command failed");
                return;
            }
        };

        for member in &status.members {
            let addr = match member.name.parse::<HostAddress>() {
                Ok(addr) => addr,
                Err(_) => continue,
            };
            let serving = member.is_serving();
            let mut nodes = self.nodes.lock();
            if let Some(node) = nodes.iter_mut().find(|n| n.addr == addr) {
                node.ok = serving;
            }
        }
    }

    fn primary_believed_healthy(&self) -> bool {
        let master = self.master.load(Ordering::SeqCst);
        if master < 0 {
            return false;
        }
        self.nodes
            .lock()
            .get(master as usize)
            .map(|n| n.ok)
            .unwrap_or(false)
    }

    fn probe_at(&self, index: usize) -> Option<ProbeHandle> {
        self.nodes.lock().get(index).map(|n| n.probe.clone())
    }

    fn find(&self, addr: &HostAddress) -> Option<usize> {
        self.nodes.lock().iter().position(|n| &n.addr == addr)
    }

    #[cfg(test)]
    pub(crate) fn seeded_for_tests(
        name: &str,
        addrs: &[&str],
        master: isize,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let nodes = addrs
            .iter()
            .map(|a| NodeRecord::new(a.parse().expect("test address"), None))
            .collect();
        let config = MonitorConfig {
            connect_timeout_ms: 50,
            retry_pause_ms: 5,
            ..MonitorConfig::default()
        };
        Self {
            name: name.to_string(),
            connector,
            config,
            nodes: Mutex::new(nodes),
            master: AtomicIsize::new(master),
            hook: Mutex::new(None),
        }
    }
}
