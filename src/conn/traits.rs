use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;

use crate::addr::HostAddress;

use super::wire::{WireRequest, WireResponse};
use super::Document;

/// Connection errors surfaced by the collaborator
///
/// The monitor's probe paths collapse every variant to "probe failed"; the
/// routing client surfaces them unchanged.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection to {addr} failed: {reason}")]
    Connect { addr: HostAddress, reason: String },

    #[error("Connection to {0} timed out")]
    Timeout(HostAddress),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Boxed single-host connection
pub type BoxedConn = Box<dyn Connection>;

/// Options for a `query` call
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    /// Maximum number of documents to return (0 = no limit)
    pub limit: i32,
    /// Number of documents to skip
    pub skip: i32,
    /// Field projection, if any
    pub fields: Option<Document>,
    /// Wire-level query option flags (see [`super::options`])
    pub options: u32,
    /// Server-side batch size hint
    pub batch_size: i32,
}

/// Buffered result handle returned by `query`
///
/// The cursor machinery itself (getMore, server-side lifetime) belongs to
/// the collaborator; this type only carries the id and the first batch.
#[derive(Debug, Default)]
pub struct Cursor {
    id: i64,
    batch: VecDeque<Document>,
}

impl Cursor {
    pub fn new(id: i64, batch: Vec<Document>) -> Self {
        Self {
            id,
            batch: batch.into(),
        }
    }

    /// Server-side cursor id, 0 when the result fit in one batch
    pub fn cursor_id(&self) -> i64 {
        self.id
    }

    pub fn next_document(&mut self) -> Option<Document> {
        self.batch.pop_front()
    }

    pub fn is_exhausted(&self) -> bool {
        self.id == 0 && self.batch.is_empty()
    }
}

/// The single-host client surface mirrored one-for-one by the routing
/// client. Implementations own one physical connection; `is_failed`
/// reports whether that connection has seen a transport error.
#[async_trait]
pub trait Connection: Send {
    /// Address this connection was opened against
    fn address(&self) -> &HostAddress;

    /// Whether the underlying transport has failed
    fn is_failed(&self) -> bool;

    /// Run the identify-yourself command; returns the member's own
    /// primary claim and the full response document.
    async fn is_master(&mut self) -> Result<(bool, Document), ConnectionError>;

    /// Run an arbitrary command against a database
    async fn run_command(
        &mut self,
        db: &str,
        command: Document,
    ) -> Result<Document, ConnectionError>;

    /// Authenticate against a database
    async fn auth(
        &mut self,
        database: &str,
        username: &str,
        secret: &str,
        digest: bool,
    ) -> Result<(), ConnectionError>;

    async fn query(
        &mut self,
        ns: &str,
        filter: Document,
        params: QueryParams,
    ) -> Result<Cursor, ConnectionError>;

    async fn find_one(
        &mut self,
        ns: &str,
        filter: Document,
        fields: Option<Document>,
        options: u32,
    ) -> Result<Option<Document>, ConnectionError>;

    async fn insert(&mut self, ns: &str, doc: Document) -> Result<(), ConnectionError>;

    async fn insert_many(&mut self, ns: &str, docs: Vec<Document>)
        -> Result<(), ConnectionError>;

    async fn update(
        &mut self,
        ns: &str,
        filter: Document,
        update: Document,
        upsert: bool,
        multi: bool,
    ) -> Result<(), ConnectionError>;

    async fn remove(
        &mut self,
        ns: &str,
        filter: Document,
        just_one: bool,
    ) -> Result<(), ConnectionError>;

    async fn kill_cursor(&mut self, cursor_id: i64) -> Result<(), ConnectionError>;

    /// Forward a raw wire-level request
    async fn call(&mut self, request: WireRequest) -> Result<WireResponse, ConnectionError>;
}

/// Opens physical connections. The monitor uses it for probe connections,
/// the routing client for user connections; the two pools never mix.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        addr: &HostAddress,
        timeout: Duration,
    ) -> Result<BoxedConn, ConnectionError>;
}
