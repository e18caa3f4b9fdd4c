//! In-process scripted replica set
//!
//! Implements the collaborator connection traits over shared in-memory
//! state so the scenarios can flip primaries, kill members, and count who
//! served what, without sockets.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use hermes::{
    BoxedConn, ClientConfig, Config, Connection, ConnectionError, Connector, Cursor, Document,
    HostAddress, MonitorConfig, QueryParams, WireOp, WireRequest, WireResponse,
};

pub fn ha(s: &str) -> HostAddress {
    s.parse().expect("test address")
}

/// Fast timings so discovery retries and sweeps do not slow the suite
pub fn test_config() -> Config {
    Config {
        monitor: MonitorConfig {
            connect_timeout_ms: 200,
            retry_pause_ms: 10,
            sweep_interval_ms: 60_000,
        },
        client: ClientConfig {
            connect_timeout_ms: 200,
        },
    }
}

#[derive(Default)]
struct MemberState {
    up: bool,
    deny_auth: bool,
    fail_next_probe: bool,
    connect_count: u64,
    probe_count: u64,
    served_queries: u64,
    served_writes: u64,
    auth_log: Vec<(String, String)>,
}

struct ClusterState {
    members: HashMap<HostAddress, MemberState>,
    /// Advertisement order for `hosts` and status reports
    order: Vec<HostAddress>,
    primary: Option<HostAddress>,
}

#[derive(Clone)]
pub struct ScriptedCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl ScriptedCluster {
    pub fn new(members: &[&str], primary: Option<&str>) -> Self {
        let order: Vec<HostAddress> = members.iter().map(|m| ha(m)).collect();
        let members = order
            .iter()
            .map(|addr| {
                (
                    addr.clone(),
                    MemberState {
                        up: true,
                        ..MemberState::default()
                    },
                )
            })
            .collect();
        Self {
            state: Arc::new(Mutex::new(ClusterState {
                members,
                order,
                primary: primary.map(ha),
            })),
        }
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(ClusterConnector {
            cluster: self.clone(),
        })
    }

    pub fn set_primary(&self, addr: &str) {
        self.state.lock().primary = Some(ha(addr));
    }

    pub fn clear_primary(&self) {
        self.state.lock().primary = None;
    }

    pub fn take_down(&self, addr: &str) {
        if let Some(member) = self.state.lock().members.get_mut(&ha(addr)) {
            member.up = false;
        }
    }

    pub fn bring_up(&self, addr: &str) {
        if let Some(member) = self.state.lock().members.get_mut(&ha(addr)) {
            member.up = true;
        }
    }

    pub fn deny_auth(&self, addr: &str) {
        if let Some(member) = self.state.lock().members.get_mut(&ha(addr)) {
            member.deny_auth = true;
        }
    }

    /// Make the next identify-yourself probe of this member error once
    pub fn fail_next_probe(&self, addr: &str) {
        if let Some(member) = self.state.lock().members.get_mut(&ha(addr)) {
            member.fail_next_probe = true;
        }
    }

    pub fn probe_count(&self, addr: &str) -> u64 {
        self.state
            .lock()
            .members
            .get(&ha(addr))
            .map(|m| m.probe_count)
            .unwrap_or(0)
    }

    pub fn connect_count(&self, addr: &str) -> u64 {
        self.state
            .lock()
            .members
            .get(&ha(addr))
            .map(|m| m.connect_count)
            .unwrap_or(0)
    }

    pub fn served_queries(&self, addr: &str) -> u64 {
        self.state
            .lock()
            .members
            .get(&ha(addr))
            .map(|m| m.served_queries)
            .unwrap_or(0)
    }

    pub fn served_writes(&self, addr: &str) -> u64 {
        self.state
            .lock()
            .members
            .get(&ha(addr))
            .map(|m| m.served_writes)
            .unwrap_or(0)
    }

    pub fn auths(&self, addr: &str) -> Vec<(String, String)> {
        self.state
            .lock()
            .members
            .get(&ha(addr))
            .map(|m| m.auth_log.clone())
            .unwrap_or_default()
    }
}

struct ClusterConnector {
    cluster: ScriptedCluster,
}

#[async_trait]
impl Connector for ClusterConnector {
    async fn connect(
        &self,
        addr: &HostAddress,
        _timeout: Duration,
    ) -> Result<BoxedConn, ConnectionError> {
        let mut state = self.cluster.state.lock();
        match state.members.get_mut(addr) {
            Some(member) if member.up => {
                member.connect_count += 1;
                Ok(Box::new(ScriptedConnection {
                    cluster: self.cluster.clone(),
                    addr: addr.clone(),
                    failed: false,
                }))
            }
            _ => Err(ConnectionError::Connect {
                addr: addr.clone(),
                reason: "member down".into(),
            }),
        }
    }
}

struct ScriptedConnection {
    cluster: ScriptedCluster,
    addr: HostAddress,
    failed: bool,
}

impl ScriptedConnection {
    /// Fail the call (and poison the connection) unless the member is up
    fn ensure_up(&mut self) -> Result<(), ConnectionError> {
        let up = self
            .cluster
            .state
            .lock()
            .members
            .get(&self.addr)
            .map(|m| m.up)
            .unwrap_or(false);
        if up {
            Ok(())
        } else {
            self.failed = true;
            Err(ConnectionError::Io(format!("{} is down", self.addr)))
        }
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn address(&self) -> &HostAddress {
        &self.addr
    }

    fn is_failed(&self) -> bool {
        self.failed
    }

    async fn is_master(&mut self) -> Result<(bool, Document), ConnectionError> {
        self.ensure_up()?;

        let interrupted = {
            let mut state = self.cluster.state.lock();
            match state.members.get_mut(&self.addr) {
                Some(member) if member.fail_next_probe => {
                    member.fail_next_probe = false;
                    true
                }
                Some(member) => {
                    member.probe_count += 1;
                    false
                }
                None => false,
            }
        };
        if interrupted {
            self.failed = true;
            return Err(ConnectionError::Io("probe interrupted".into()));
        }

        let state = self.cluster.state.lock();
        let hosts: Vec<String> = state.order.iter().map(|a| a.to_string()).collect();
        let is_primary = state.primary.as_ref() == Some(&self.addr);
        let mut doc = json!({
            "ismaster": is_primary,
            "hosts": hosts,
        });
        if let Some(primary) = &state.primary {
            doc["primary"] = json!(primary.to_string());
        }
        Ok((is_primary, doc))
    }

    async fn run_command(
        &mut self,
        _db: &str,
        command: Document,
    ) -> Result<Document, ConnectionError> {
        self.ensure_up()?;
        if command.get("replSetGetStatus").is_none() {
            return Err(ConnectionError::Protocol("unknown command".into()));
        }

        let state = self.cluster.state.lock();
        let members: Vec<Document> = state
            .order
            .iter()
            .map(|addr| {
                let up = state.members.get(addr).map(|m| m.up).unwrap_or(false);
                let is_primary = state.primary.as_ref() == Some(addr);
                let health = if up { 1 } else { 0 };
                let state_code = if is_primary {
                    1
                } else if up {
                    2
                } else {
                    8
                };
                json!({
                    "name": addr.to_string(),
                    "health": health,
                    "state": state_code,
                })
            })
            .collect();
        Ok(json!({ "members": members }))
    }

    async fn auth(
        &mut self,
        database: &str,
        username: &str,
        _secret: &str,
        _digest: bool,
    ) -> Result<(), ConnectionError> {
        self.ensure_up()?;
        let mut state = self.cluster.state.lock();
        match state.members.get_mut(&self.addr) {
            Some(member) if member.deny_auth => {
                Err(ConnectionError::Auth(format!("auth denied on {}", self.addr)))
            }
            Some(member) => {
                member
                    .auth_log
                    .push((database.to_string(), username.to_string()));
                Ok(())
            }
            None => Err(ConnectionError::Auth("unknown member".into())),
        }
    }

    async fn query(
        &mut self,
        _ns: &str,
        _filter: Document,
        _params: QueryParams,
    ) -> Result<Cursor, ConnectionError> {
        self.ensure_up()?;
        let mut state = self.cluster.state.lock();
        if let Some(member) = state.members.get_mut(&self.addr) {
            member.served_queries += 1;
        }
        Ok(Cursor::new(0, vec![json!({"served_by": self.addr.to_string()})]))
    }

    async fn find_one(
        &mut self,
        _ns: &str,
        _filter: Document,
        _fields: Option<Document>,
        _options: u32,
    ) -> Result<Option<Document>, ConnectionError> {
        self.ensure_up()?;
        let mut state = self.cluster.state.lock();
        if let Some(member) = state.members.get_mut(&self.addr) {
            member.served_queries += 1;
        }
        Ok(Some(json!({"served_by": self.addr.to_string()})))
    }

    async fn insert(&mut self, _ns: &str, _doc: Document) -> Result<(), ConnectionError> {
        self.ensure_up()?;
        let mut state = self.cluster.state.lock();
        if let Some(member) = state.members.get_mut(&self.addr) {
            member.served_writes += 1;
        }
        Ok(())
    }

    async fn insert_many(
        &mut self,
        _ns: &str,
        docs: Vec<Document>,
    ) -> Result<(), ConnectionError> {
        self.ensure_up()?;
        let mut state = self.cluster.state.lock();
        if let Some(member) = state.members.get_mut(&self.addr) {
            member.served_writes += docs.len() as u64;
        }
        Ok(())
    }

    async fn update(
        &mut self,
        _ns: &str,
        _filter: Document,
        _update: Document,
        _upsert: bool,
        _multi: bool,
    ) -> Result<(), ConnectionError> {
        self.ensure_up()?;
        let mut state = self.cluster.state.lock();
        if let Some(member) = state.members.get_mut(&self.addr) {
            member.served_writes += 1;
        }
        Ok(())
    }

    async fn remove(
        &mut self,
        _ns: &str,
        _filter: Document,
        _just_one: bool,
    ) -> Result<(), ConnectionError> {
        self.ensure_up()?;
        let mut state = self.cluster.state.lock();
        if let Some(member) = state.members.get_mut(&self.addr) {
            member.served_writes += 1;
        }
        Ok(())
    }

    async fn kill_cursor(&mut self, _cursor_id: i64) -> Result<(), ConnectionError> {
        self.ensure_up()?;
        let mut state = self.cluster.state.lock();
        if let Some(member) = state.members.get_mut(&self.addr) {
            member.served_writes += 1;
        }
        Ok(())
    }

    async fn call(&mut self, request: WireRequest) -> Result<WireResponse, ConnectionError> {
        self.ensure_up()?;
        let mut state = self.cluster.state.lock();
        if let Some(member) = state.members.get_mut(&self.addr) {
            if request.op == WireOp::Query || request.op == WireOp::GetMore {
                member.served_queries += 1;
            } else {
                member.served_writes += 1;
            }
        }
        Ok(WireResponse {
            flags: 0,
            payload: Vec::new(),
        })
    }
}
