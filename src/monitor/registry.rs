use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::addr::HostAddress;
use crate::config::Config;
use crate::conn::Connector;

use super::set::{ChangeHook, MonitorError, SetMonitor};
use super::sweeper;

/// Shared state between the registry handle and the sweeper task
pub(crate) struct RegistryInner {
    pub(crate) sets: Mutex<HashMap<String, Arc<SetMonitor>>>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) config: Config,
    /// Process-wide change hook, copied into every monitor constructed
    /// after installation
    hook: Mutex<Option<ChangeHook>>,
    pub(crate) shutdown: CancellationToken,
    sweeper_started: AtomicBool,
}

/// Process-wide mapping from set name to its single shared monitor
///
/// Create one at process start and share it; the background sweeper is
/// launched lazily by the first `get`. Monitors, once inserted, are never
/// removed.
pub struct MonitorRegistry {
    inner: Arc<RegistryInner>,
}

impl MonitorRegistry {
    pub fn new(connector: Arc<dyn Connector>, config: Config) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sets: Mutex::new(HashMap::new()),
                connector,
                config,
                hook: Mutex::new(None),
                shutdown: CancellationToken::new(),
                sweeper_started: AtomicBool::new(false),
            }),
        }
    }

    /// Fetch the monitor for `name`, constructing it from `seeds` on first
    /// use. Seeds are ignored for a name that is already registered; the
    /// existing monitor's evolved node list is authoritative.
    ///
    /// The registry lock is never held across the construction probes;
    /// concurrent callers racing on a new name all receive the same
    /// monitor.
    pub async fn get(&self, name: &str, seeds: &[HostAddress]) -> Arc<SetMonitor> {
        if let Some(existing) = self.inner.sets.lock().get(name) {
            return existing.clone();
        }

        let hook = self.inner.hook.lock().clone();
        let monitor = Arc::new(
            SetMonitor::new(
                name,
                seeds,
                self.inner.connector.clone(),
                self.inner.config.monitor.clone(),
                hook,
            )
            .await,
        );

        let monitor = {
            let mut sets = self.inner.sets.lock();
            sets.entry(name.to_string()).or_insert(monitor).clone()
        };

        self.ensure_sweeper();
        monitor
    }

    /// Install the process-wide membership-change hook. Must be installed
    /// before the monitors whose growth it should observe are constructed.
    pub fn set_change_hook(&self, hook: ChangeHook) -> Result<(), MonitorError> {
        let mut slot = self.inner.hook.lock();
        if slot.is_some() {
            return Err(MonitorError::HookAlreadyInstalled);
        }
        *slot = Some(hook);
        Ok(())
    }

    /// Run one sweep round over every registered monitor
    pub async fn check_all(&self) {
        sweeper::check_all(&self.inner).await;
    }

    /// Names of all registered sets
    pub fn set_names(&self) -> Vec<String> {
        self.inner.sets.lock().keys().cloned().collect()
    }

    /// Stop the background sweeper
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub(crate) fn connector(&self) -> Arc<dyn Connector> {
        self.inner.connector.clone()
    }

    pub(crate) fn config(&self) -> &Config {
        &self.inner.config
    }

    fn ensure_sweeper(&self) {
        if !self.inner.sweeper_started.swap(true, Ordering::SeqCst) {
            sweeper::spawn(self.inner.clone());
        }
    }
}

impl Drop for MonitorRegistry {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}
