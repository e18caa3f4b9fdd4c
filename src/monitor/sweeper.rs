//! Background sweeper
//!
//! One long-running task per registry that periodically re-checks every
//! registered set. Each round works from point-in-time snapshots of the
//! name map, so a set registered mid-round may be picked up this round or
//! the next, but never misses more than one interval.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use super::registry::RegistryInner;

pub(crate) fn spawn(inner: Arc<RegistryInner>) {
    tokio::spawn(run(inner));
}

async fn run(inner: Arc<RegistryInner>) {
    let interval = inner.config.monitor.sweep_interval();
    info!(interval_ms = interval.as_millis() as u64, "replica set sweeper started");

    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => {
                info!("replica set sweeper shutting down");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                check_all(&inner).await;
            }
        }
    }
}

/// One sweep round: check every monitor exactly once, without holding the
/// registry lock across any probe.
pub(crate) async fn check_all(inner: &RegistryInner) {
    let mut seen: HashSet<String> = HashSet::new();

    loop {
        let next = inner
            .sets
            .lock()
            .iter()
            .find(|(name, _)| !seen.contains(*name))
            .map(|(name, monitor)| (name.clone(), monitor.clone()));

        let Some((name, monitor)) = next else {
            break;
        };

        debug!(set = %name, "checking replica set");
        seen.insert(name);
        monitor.check().await;
    }
}
