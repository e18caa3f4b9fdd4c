//! Typed views over probe replies
//!
//! Probe responses are self-describing documents; these views pull out the
//! few paths the monitor reads. Missing or oddly-typed fields fall back to
//! defaults, so a malformed reply is a failed probe rather than a panic.

use serde::Deserialize;

use super::Document;

/// Member state codes from the status report
pub const STATE_PRIMARY: i64 = 1;
pub const STATE_SECONDARY: i64 = 2;

/// Fields the monitor reads from the identify-yourself reply
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IsMasterReply {
    #[serde(default, rename = "ismaster")]
    pub is_master: bool,
    /// Voting members, as `host:port` strings
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Passive (non-electable) members
    #[serde(default)]
    pub passives: Vec<String>,
    /// The member this node currently believes is primary
    #[serde(default)]
    pub primary: Option<String>,
}

impl IsMasterReply {
    pub fn from_document(doc: Document) -> Self {
        serde_json::from_value(doc).unwrap_or_default()
    }
}

/// Replica-set status report
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusReply {
    #[serde(default)]
    pub members: Vec<MemberStatus>,
}

impl StatusReply {
    pub fn from_document(doc: Document) -> Self {
        serde_json::from_value(doc).unwrap_or_default()
    }
}

/// One member entry from the status report
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberStatus {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub health: f64,
    #[serde(default)]
    pub state: f64,
}

impl MemberStatus {
    /// A member serves traffic when healthy and either primary or secondary
    pub fn is_serving(&self) -> bool {
        self.health as i64 == 1 && matches!(self.state as i64, STATE_PRIMARY | STATE_SECONDARY)
    }
}
