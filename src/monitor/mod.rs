//! Applies the runtime's task events to the registry.
//!
//! The [`EventMonitor`] owns one background task that subscribes to `/tasks/start` and
//! `/tasks/delete`, classifies the container each event refers to and adds or removes
//! the event's pid. Events are applied strictly in delivery order. Per-event failures
//! are logged and the event is dropped; only a failing feed ends the task, in which case
//! the error is sent on the error channel. The monitor never reconnects on its own.
//!
//! ```text
//! Idle --start()--> Running --stop()--> Stopping --> Stopped
//!                      |                                ^
//!                      +------- feed error/closed ------+
//! ```
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::registry::Registry;
use crate::runtime::RuntimeClient;

mod error;
mod event_loop;
mod reconcile;

pub use error::{Error, Result};
pub use reconcile::reconcile;

use event_loop::{EventLoop, StopRequest};

/// Default deadline for looking up the container of an event.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of an [`EventMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Deadline for the container lookup performed for every event.
    pub lookup_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }
}

pub struct EventMonitor<C: RuntimeClient> {
    client: Arc<C>,
    registry: Arc<Registry>,
    config: MonitorConfig,
    state: Arc<watch::Sender<MonitorState>>,
    stop_tx: Option<mpsc::Sender<StopRequest>>,
    handle: Option<JoinHandle<()>>,
    error_tx: mpsc::Sender<Error>,
    error_rx: Option<mpsc::Receiver<Error>>,
    dropped_events: Arc<AtomicU64>,
}

impl<C: RuntimeClient> EventMonitor<C> {
    pub fn new(client: Arc<C>, registry: Arc<Registry>, config: MonitorConfig) -> Self {
        let (state, _) = watch::channel(MonitorState::Idle);
        // a monitor runs at most once and reports at most one terminal error
        let (error_tx, error_rx) = mpsc::channel(1);
        Self {
            client,
            registry,
            config,
            state: Arc::new(state),
            stop_tx: None,
            handle: None,
            error_tx,
            error_rx: Some(error_rx),
            dropped_events: Arc::default(),
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Returns a receiver observing state transitions.
    pub fn watch_state(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    /// Hands out the channel on which terminal feed errors are reported.
    ///
    /// Returns `None` if the channel was already taken.
    pub fn take_errors(&mut self) -> Option<mpsc::Receiver<Error>> {
        self.error_rx.take()
    }

    /// Number of events dropped because their container could not be looked up.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Starts the background task.
    ///
    /// Returns as soon as the task is spawned; subscription failures are reported on the
    /// error channel.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyRunning`] if the monitor is running.
    /// - [`Error::AlreadyStopped`] if the monitor ran before; a stopped monitor cannot be
    ///   restarted.
    pub fn start(&mut self) -> Result<()> {
        match self.state() {
            MonitorState::Idle => {}
            MonitorState::Running | MonitorState::Stopping => return Err(Error::AlreadyRunning),
            MonitorState::Stopped => return Err(Error::AlreadyStopped),
        }

        let (stop_tx, stop_rx) = mpsc::channel(1);
        self.state.send_replace(MonitorState::Running);
        let event_loop = EventLoop {
            client: Arc::clone(&self.client),
            registry: Arc::clone(&self.registry),
            lookup_timeout: self.config.lookup_timeout,
            state: Arc::clone(&self.state),
            error_tx: self.error_tx.clone(),
            dropped_events: Arc::clone(&self.dropped_events),
        };
        self.handle = Some(tokio::spawn(event_loop.run(stop_rx)));
        self.stop_tx = Some(stop_tx);
        log::info!("Started event monitor");

        Ok(())
    }

    /// Stops the background task and waits until it closed the runtime connection.
    ///
    /// # Errors
    ///
    /// - [`Error::NotRunning`] if the monitor was never started.
    /// - [`Error::AlreadyStopped`] if the monitor was stopped before or its feed failed.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state() == MonitorState::Idle {
            return Err(Error::NotRunning);
        }
        let Some(stop_tx) = self.stop_tx.take() else {
            return Err(Error::AlreadyStopped);
        };

        self.state.send_if_modified(|state| {
            if *state == MonitorState::Running {
                *state = MonitorState::Stopping;
                true
            } else {
                false
            }
        });

        let (ack_tx, ack_rx) = oneshot::channel();
        let acknowledged = stop_tx.send(ack_tx).await.is_ok() && ack_rx.await.is_ok();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                log::error!("Event monitor task failed: {}", err);
            }
        }
        // the task may have died without publishing its final state
        self.state.send_replace(MonitorState::Stopped);

        if acknowledged {
            log::info!("Stopped event monitor");
            Ok(())
        } else {
            Err(Error::AlreadyStopped)
        }
    }
}
