//! Routing client
//!
//! A per-caller façade over one replica set: writes always reach the
//! primary, reads flagged secondary-ok are served by a live secondary with
//! a bounded retry before falling back to the primary. The client holds at
//! most two user connections (primary, secondary), replaced on failure and
//! re-authenticated from the credential cache.

mod credentials;

pub use credentials::{CredentialCache, CredentialRecord};

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::addr::HostAddress;
use crate::config::ClientConfig;
use crate::conn::{
    BoxedConn, ConnectionError, Connector, Cursor, Document, QueryParams, WireRequest,
    WireResponse, options,
};
use crate::monitor::{MonitorError, MonitorRegistry, SetMonitor};

/// Errors surfaced by the routing client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Number of secondary attempts before a secondary-ok read falls back to
/// the primary
const SECONDARY_READ_ATTEMPTS: usize = 2;

/// A single logical connection to a replica set
///
/// Owned by one caller at a time; the monitor it consults is shared.
pub struct RoutingClient {
    monitor: Arc<SetMonitor>,
    connector: Arc<dyn Connector>,
    config: ClientConfig,
    primary: Option<(HostAddress, BoxedConn)>,
    secondary: Option<(HostAddress, BoxedConn)>,
    credentials: CredentialCache,
}

impl RoutingClient {
    /// Create a client for the named set, registering the set (and seeding
    /// its monitor) on first use.
    pub async fn new(registry: &MonitorRegistry, name: &str, seeds: &[HostAddress]) -> Self {
        let monitor = registry.get(name, seeds).await;
        Self {
            monitor,
            connector: registry.connector(),
            config: registry.config().client.clone(),
            primary: None,
            secondary: None,
            credentials: CredentialCache::new(),
        }
    }

    /// The shared monitor backing this client
    pub fn monitor(&self) -> &Arc<SetMonitor> {
        &self.monitor
    }

    /// Eagerly locate and connect to the primary. Returns `false` instead
    /// of an error when no primary can be found, after telling the monitor
    /// about the last-known one.
    pub async fn connect(&mut self) -> bool {
        match self.check_primary().await {
            Ok(_) => true,
            Err(error) => {
                debug!(set = %self.monitor.name(), %error, "unable to reach primary");
                if let Some((addr, _)) = &self.primary {
                    self.monitor.notify_primary_failure(addr);
                }
                false
            }
        }
    }

    /// Authenticate against the primary; on success the credentials are
    /// cached and replayed onto every connection opened later.
    pub async fn auth(
        &mut self,
        database: &str,
        username: &str,
        secret: &str,
        digest: bool,
    ) -> Result<(), ClientError> {
        let conn = self.check_primary().await?;
        conn.auth(database, username, secret, digest).await?;
        self.credentials.push(CredentialRecord {
            database: database.to_string(),
            username: username.to_string(),
            secret: secret.to_string(),
            digest,
        });
        Ok(())
    }

    pub async fn insert(&mut self, ns: &str, doc: Document) -> Result<(), ClientError> {
        let conn = self.check_primary().await?;
        conn.insert(ns, doc).await?;
        Ok(())
    }

    pub async fn insert_many(&mut self, ns: &str, docs: Vec<Document>) -> Result<(), ClientError> {
        let conn = self.check_primary().await?;
        conn.insert_many(ns, docs).await?;
        Ok(())
    }

    pub async fn update(
        &mut self,
        ns: &str,
        filter: Document,
        update: Document,
        upsert: bool,
        multi: bool,
    ) -> Result<(), ClientError> {
        let conn = self.check_primary().await?;
        conn.update(ns, filter, update, upsert, multi).await?;
        Ok(())
    }

    pub async fn remove(
        &mut self,
        ns: &str,
        filter: Document,
        just_one: bool,
    ) -> Result<(), ClientError> {
        let conn = self.check_primary().await?;
        conn.remove(ns, filter, just_one).await?;
        Ok(())
    }

    pub async fn kill_cursor(&mut self, cursor_id: i64) -> Result<(), ClientError> {
        let conn = self.check_primary().await?;
        conn.kill_cursor(cursor_id).await?;
        Ok(())
    }

    /// Run a query, served by a secondary when the options allow it
    pub async fn query(
        &mut self,
        ns: &str,
        filter: Document,
        params: QueryParams,
    ) -> Result<Cursor, ClientError> {
        if params.options & options::SECONDARY_OK != 0 {
            for _ in 0..SECONDARY_READ_ATTEMPTS {
                let attempt = match self.check_secondary().await {
                    Ok(conn) => conn.query(ns, filter.clone(), params.clone()).await,
                    Err(error) => {
                        debug!(set = %self.monitor.name(), %error, "no secondary available");
                        continue;
                    }
                };
                match attempt {
                    Ok(cursor) => return Ok(cursor),
                    Err(error) => {
                        debug!(set = %self.monitor.name(), %error, "secondary read failed");
                        self.invalidate_secondary();
                    }
                }
            }
        }

        let conn = self.check_primary().await?;
        Ok(conn.query(ns, filter, params).await?)
    }

    /// Fetch a single document, served by a secondary when the options
    /// allow it
    pub async fn find_one(
        &mut self,
        ns: &str,
        filter: Document,
        fields: Option<Document>,
        query_options: u32,
    ) -> Result<Option<Document>, ClientError> {
        if query_options & options::SECONDARY_OK != 0 {
            for _ in 0..SECONDARY_READ_ATTEMPTS {
                let attempt = match self.check_secondary().await {
                    Ok(conn) => {
                        conn.find_one(ns, filter.clone(), fields.clone(), query_options)
                            .await
                    }
                    Err(error) => {
                        debug!(set = %self.monitor.name(), %error, "no secondary available");
                        continue;
                    }
                };
                match attempt {
                    Ok(doc) => return Ok(doc),
                    Err(error) => {
                        debug!(set = %self.monitor.name(), %error, "secondary read failed");
                        self.invalidate_secondary();
                    }
                }
            }
        }

        let conn = self.check_primary().await?;
        Ok(conn.find_one(ns, filter, fields, query_options).await?)
    }

    /// Forward a raw wire request, routing secondary-ok queries like
    /// `query` does
    pub async fn call(&mut self, request: WireRequest) -> Result<WireResponse, ClientError> {
        if request.allows_secondary() {
            for _ in 0..SECONDARY_READ_ATTEMPTS {
                let attempt = match self.check_secondary().await {
                    Ok(conn) => conn.call(request.clone()).await,
                    Err(error) => {
                        debug!(set = %self.monitor.name(), %error, "no secondary available");
                        continue;
                    }
                };
                match attempt {
                    Ok(response) => return Ok(response),
                    Err(error) => {
                        debug!(set = %self.monitor.name(), %error, "secondary read failed");
                        self.invalidate_secondary();
                    }
                }
            }
        }

        let conn = self.check_primary().await?;
        Ok(conn.call(request).await?)
    }

    /// Direct access to the primary connection, checked and authenticated
    pub async fn primary_conn(&mut self) -> Result<&mut BoxedConn, ClientError> {
        self.check_primary().await
    }

    /// Direct access to a secondary connection, checked and authenticated
    pub async fn secondary_conn(&mut self) -> Result<&mut BoxedConn, ClientError> {
        self.check_secondary().await
    }

    /// Return the cached primary connection if it still points at the
    /// current primary and is healthy; otherwise open a fresh one and
    /// replay credentials.
    async fn check_primary(&mut self) -> Result<&mut BoxedConn, ClientError> {
        let master = self.monitor.get_primary().await?;

        let reusable = matches!(
            &self.primary,
            Some((addr, conn)) if *addr == master && !conn.is_failed()
        );
        if !reusable {
            if matches!(&self.primary, Some((addr, _)) if *addr == master) {
                // same member, dead connection
                self.monitor.notify_primary_failure(&master);
            }
            let master = self.monitor.get_primary().await?;
            let mut conn = self
                .connector
                .connect(&master, self.config.connect_timeout())
                .await?;
            self.credentials.replay(&mut conn, self.monitor.name()).await;
            self.primary = Some((master, conn));
        }

        match self.primary.as_mut() {
            Some((_, conn)) => Ok(conn),
            None => Err(MonitorError::NoPrimaryFound(self.monitor.name().to_string()).into()),
        }
    }

    /// Return the cached secondary connection if it is healthy; otherwise
    /// report the old one failed, ask the monitor for a replacement, and
    /// connect to it.
    async fn check_secondary(&mut self) -> Result<&mut BoxedConn, ClientError> {
        let reusable = matches!(&self.secondary, Some((_, conn)) if !conn.is_failed());
        if !reusable {
            let old = self.secondary.take();
            if let Some((addr, _)) = &old {
                self.monitor.notify_secondary_failure(addr);
            }
            let fresh = self.monitor.get_secondary()?;
            match old {
                Some((addr, conn)) if addr == fresh => {
                    // the monitor handed back the same member; keep the
                    // connection and let the caller's retry surface it
                    self.secondary = Some((addr, conn));
                }
                _ => {
                    let mut conn = self
                        .connector
                        .connect(&fresh, self.config.connect_timeout())
                        .await?;
                    self.credentials.replay(&mut conn, self.monitor.name()).await;
                    self.secondary = Some((fresh, conn));
                }
            }
        }

        match self.secondary.as_mut() {
            Some((_, conn)) => Ok(conn),
            None => Err(MonitorError::SecondaryUnavailable(self.monitor.name().to_string()).into()),
        }
    }

    fn invalidate_secondary(&mut self) {
        if let Some((addr, _)) = self.secondary.take() {
            self.monitor.notify_secondary_failure(&addr);
        }
    }
}
