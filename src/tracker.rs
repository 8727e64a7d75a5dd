use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::container::ContainerRecord;
use crate::containerd::ContainerdClient;
use crate::monitor::{self, EventMonitor, MonitorConfig, MonitorState};
use crate::namespace::NamespaceResolver;
use crate::registry::Registry;
use crate::runtime::RuntimeClient;

/// Tracks the containers of one runtime namespace and their processes.
///
/// Creating a tracker enumerates the containers that are already running; [`start`]
/// then keeps the registry up to date from the runtime's event feed.
///
/// [`start`]: Tracker::start
pub struct Tracker<C: RuntimeClient> {
    client: Arc<C>,
    registry: Arc<Registry>,
    monitor: EventMonitor<C>,
}

impl Tracker<ContainerdClient> {
    /// Connects to containerd and seeds the registry from the running containers.
    ///
    /// # Errors
    ///
    /// Fails if containerd cannot be reached or its containers cannot be listed.
    pub async fn connect(
        socket_path: impl AsRef<Path>,
        namespace: &str,
        resolver: NamespaceResolver,
        config: MonitorConfig,
    ) -> crate::error::Result<Self> {
        let client = ContainerdClient::connect(socket_path, namespace).await?;
        Ok(Self::new(client, resolver, config).await?)
    }
}

impl<C: RuntimeClient> Tracker<C> {
    /// Seeds a registry from the containers `client` reports as running.
    ///
    /// # Errors
    ///
    /// Returns [`monitor::Error::Enumerate`] if the containers cannot be listed.
    pub async fn new(
        client: C,
        resolver: NamespaceResolver,
        config: MonitorConfig,
    ) -> monitor::Result<Self> {
        let client = Arc::new(client);
        let registry = Arc::new(Registry::new(resolver));

        monitor::reconcile(client.as_ref(), &registry).await?;
        registry.log_snapshot();

        let monitor = EventMonitor::new(Arc::clone(&client), Arc::clone(&registry), config);
        Ok(Self {
            client,
            registry,
            monitor,
        })
    }

    pub fn start(&mut self) -> monitor::Result<()> {
        self.monitor.start()
    }

    /// Stops watching events and closes the runtime connection.
    pub async fn stop(&mut self) -> monitor::Result<()> {
        let result = self.monitor.stop().await;
        match result {
            // an idle tracker can still be started later
            Err(monitor::Error::NotRunning) => {}
            _ => self.client.close().await,
        }
        result
    }

    /// Hands out the channel on which terminal event feed errors are reported.
    pub fn errors(&mut self) -> Option<mpsc::Receiver<monitor::Error>> {
        self.monitor.take_errors()
    }

    pub fn state(&self) -> MonitorState {
        self.monitor.state()
    }

    pub fn dropped_events(&self) -> u64 {
        self.monitor.dropped_events()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn snapshot(&self) -> Vec<ContainerRecord> {
        self.registry.snapshot()
    }
}
