use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use super::{Error, MonitorState};
use crate::classifier::{self, Category, Classification};
use crate::container::ContainerID;
use crate::error::ResultOkLogExt;
use crate::registry::Registry;
use crate::runtime::{
    EventPayload, EventSubscription, RuntimeClient, RuntimeEvent, TASK_DELETE_TOPIC,
    TASK_START_TOPIC, topic_filter,
};

/// Stop request carrying the acknowledgement slot.
pub(super) type StopRequest = oneshot::Sender<()>;

enum Exit {
    Stop(Option<StopRequest>),
    Failed(Error),
}

/// State owned by the background task applying runtime events to the registry.
pub(super) struct EventLoop<C: RuntimeClient> {
    pub(super) client: Arc<C>,
    pub(super) registry: Arc<Registry>,
    pub(super) lookup_timeout: Duration,
    pub(super) state: Arc<watch::Sender<MonitorState>>,
    pub(super) error_tx: mpsc::Sender<Error>,
    pub(super) dropped_events: Arc<AtomicU64>,
}

impl<C: RuntimeClient> EventLoop<C> {
    pub(super) async fn run(self, mut stop_rx: mpsc::Receiver<StopRequest>) {
        let filters = vec![
            topic_filter(TASK_START_TOPIC),
            topic_filter(TASK_DELETE_TOPIC),
        ];
        let subscribed = tokio::select! {
            biased;
            ack = stop_rx.recv() => {
                self.shutdown(ack).await;
                return;
            }
            subscribed = self.client.subscribe(filters) => subscribed,
        };
        let mut subscription = match subscribed {
            Ok(subscription) => subscription,
            Err(err) => {
                self.fail(Error::Subscribe(err)).await;
                return;
            }
        };
        log::info!("Subscribed to runtime task events");

        let exit = loop {
            tokio::select! {
                biased;
                ack = stop_rx.recv() => break Exit::Stop(ack),
                next = subscription.next_event() => match next {
                    Ok(Some(event)) => self.handle_event(event).await,
                    Ok(None) => break Exit::Failed(Error::FeedClosed),
                    Err(err) => break Exit::Failed(Error::EventStream(err)),
                },
            }
        };
        drop(subscription);

        match exit {
            Exit::Stop(ack) => self.shutdown(ack).await,
            Exit::Failed(err) => self.fail(err).await,
        }
    }

    /// Closes the connection, then acknowledges the stop request.
    async fn shutdown(&self, ack: Option<StopRequest>) {
        log::info!("Received stop request, closing runtime connection");
        self.client.close().await;
        self.state.send_replace(MonitorState::Stopped);
        if let Some(ack) = ack {
            // the requester may have given up waiting
            let _ = ack.send(());
        }
    }

    async fn fail(&self, err: Error) {
        log::error!("Event monitor terminated: {}", err);
        self.client.close().await;
        self.state.send_replace(MonitorState::Stopped);
        if let Err(err) = self.error_tx.try_send(err) {
            log::warn!("Failed to report event monitor error: {}", err);
        }
    }

    async fn handle_event(&self, event: RuntimeEvent) {
        match event.payload {
            EventPayload::TaskStart { container_id, pid } => {
                let Some(classification) = self.lookup(&container_id).await else {
                    return;
                };
                match classification.category {
                    Category::Container | Category::KubernetesContainer => {
                        let Some(id) = ContainerID::new(&container_id).ok_log() else {
                            return;
                        };
                        log::info!("Container `{}` started process {}", id, pid);
                        self.registry
                            .add_process(id, pid, classification.identity)
                            .ok_log();
                        self.registry.log_snapshot();
                    }
                    Category::Sandbox | Category::KubernetesSandbox => {
                        log::debug!("Ignoring task start of sandbox `{}`", container_id)
                    }
                    Category::Unknown => {
                        log::debug!("Ignoring task start of unknown entity `{}`", container_id)
                    }
                }
            }
            EventPayload::TaskDelete {
                container_id,
                pid,
                exec_id,
            } => {
                let Some(classification) = self.lookup(&container_id).await else {
                    return;
                };
                match classification.category {
                    Category::Container | Category::KubernetesContainer => {
                        log::info!(
                            "Container `{}` deleted process {} (exec_id={:?})",
                            container_id,
                            pid,
                            exec_id
                        );
                        if self
                            .registry
                            .remove_process(&container_id, pid)
                            .ok_log_at(log::Level::Warn)
                            .is_some()
                        {
                            self.registry.log_snapshot();
                        }
                    }
                    Category::Sandbox | Category::KubernetesSandbox => {
                        log::debug!("Ignoring task delete of sandbox `{}`", container_id)
                    }
                    Category::Unknown => {
                        log::debug!("Ignoring task delete of unknown entity `{}`", container_id)
                    }
                }
            }
            EventPayload::Other { type_url } => log::debug!(
                "Discarding event `{}` on topic `{}`",
                type_url,
                event.topic
            ),
            EventPayload::Empty => {
                log::debug!("No event payload attached on topic `{}`", event.topic)
            }
        }
    }

    /// Classifies the container an event refers to.
    ///
    /// Returns `None` and counts the event as dropped if the lookup fails or times out.
    async fn lookup(&self, container_id: &str) -> Option<Classification> {
        let lookup =
            tokio::time::timeout(self.lookup_timeout, self.client.get_container(container_id))
                .await;
        let err = match lookup {
            Ok(Ok(labels)) => return Some(classifier::classify(&labels)),
            Ok(Err(source)) => Error::Lookup {
                id: container_id.to_owned(),
                source,
            },
            Err(_) => Error::LookupTimeout {
                id: container_id.to_owned(),
                timeout: self.lookup_timeout,
            },
        };

        let dropped = self.dropped_events.fetch_add(1, Ordering::Relaxed) + 1;
        log::warn!("Dropping event ({} dropped so far): {}", dropped, err);
        None
    }
}
