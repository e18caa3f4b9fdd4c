//! Replica-set aware client core
//!
//! Client-side topology awareness for a primary/secondary replicated
//! document database: discover and track set membership from a seed list,
//! follow primary elections, hand out live secondaries for read load, and
//! route caller operations through a single logical connection that sends
//! writes to the primary and secondary-ok reads to a secondary.
//!
//! The wire protocol, cursor machinery, and single-host connection are
//! collaborators supplied by the embedding driver through the [`conn`]
//! traits; this crate owns everything above them.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # async fn run(connector: Arc<dyn hermes::Connector>) {
//! use hermes::{Config, HostAddress, MonitorRegistry, RoutingClient};
//!
//! let registry = MonitorRegistry::new(connector, Config::default());
//! let seeds: Vec<HostAddress> = vec!["db-1:27017".parse().unwrap()];
//! let mut client = RoutingClient::new(&registry, "rs0", &seeds).await;
//! if client.connect().await {
//!     client.insert("app.events", serde_json::json!({"kind": "login"})).await.unwrap();
//! }
//! # }
//! ```

pub mod addr;
pub mod client;
pub mod config;
pub mod conn;
pub mod monitor;

pub use addr::{AddrParseError, HostAddress};
pub use client::{ClientError, CredentialCache, CredentialRecord, RoutingClient};
pub use config::{ClientConfig, Config, ConfigError, MonitorConfig};
pub use conn::{
    options, BoxedConn, Connection, ConnectionError, Connector, Cursor, Document, IsMasterReply,
    MemberStatus, QueryParams, StatusReply, WireOp, WireRequest, WireResponse,
};
pub use monitor::{ChangeHook, MonitorError, MonitorRegistry, SetMonitor};
