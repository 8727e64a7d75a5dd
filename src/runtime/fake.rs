//! In-memory runtime used to drive the monitor and tracker in tests.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use super::{
    ContainerDescriptor, Error, EventPayload, EventSubscription, Labels, Result, RuntimeClient,
    RuntimeEvent, TASK_DELETE_TOPIC, TASK_START_TOPIC,
};
use crate::classifier::{
    CONTAINER_KIND_LABEL, CONTAINER_NAME_LABEL, POD_NAME_LABEL, POD_NAMESPACE_LABEL,
};

type EventResult = Result<Option<RuntimeEvent>>;

#[derive(Default)]
struct State {
    containers: Mutex<HashMap<String, Labels>>,
    pids: Mutex<HashMap<String, Vec<u32>>>,
    feed: Mutex<Option<mpsc::UnboundedReceiver<EventResult>>>,
    filters: Mutex<Vec<String>>,
    lookup_delay: Mutex<Option<Duration>>,
    fail_subscribe: AtomicBool,
    closed: AtomicBool,
    close_count: AtomicUsize,
}

#[derive(Clone, Default)]
pub(crate) struct FakeRuntime {
    state: Arc<State>,
}

/// Sending side of the fake event feed. Dropping it ends the feed.
pub(crate) struct FakeFeed {
    tx: mpsc::UnboundedSender<EventResult>,
}

pub(crate) fn container_labels() -> Labels {
    Labels::from([(CONTAINER_KIND_LABEL.to_owned(), "container".to_owned())])
}

pub(crate) fn sandbox_labels() -> Labels {
    Labels::from([(CONTAINER_KIND_LABEL.to_owned(), "sandbox".to_owned())])
}

pub(crate) fn kubernetes_container_labels(pod: &str, namespace: &str, name: &str) -> Labels {
    let mut labels = container_labels();
    labels.insert(POD_NAME_LABEL.to_owned(), pod.to_owned());
    labels.insert(POD_NAMESPACE_LABEL.to_owned(), namespace.to_owned());
    labels.insert(CONTAINER_NAME_LABEL.to_owned(), name.to_owned());
    labels
}

impl FakeRuntime {
    pub(crate) fn new() -> (Self, FakeFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = Self::default();
        *runtime.state.feed.lock().unwrap() = Some(rx);
        (runtime, FakeFeed { tx })
    }

    pub(crate) fn add_container(&self, id: &str, labels: Labels, pids: &[u32]) {
        self.state
            .containers
            .lock()
            .unwrap()
            .insert(id.to_owned(), labels);
        if !pids.is_empty() {
            self.state
                .pids
                .lock()
                .unwrap()
                .insert(id.to_owned(), pids.to_vec());
        }
    }

    pub(crate) fn set_lookup_delay(&self, delay: Duration) {
        *self.state.lookup_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn fail_subscribe(&self) {
        self.state.fail_subscribe.store(true, Ordering::SeqCst);
    }

    pub(crate) fn filters(&self) -> Vec<String> {
        self.state.filters.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Number of times the connection was actually closed.
    pub(crate) fn close_count(&self) -> usize {
        self.state.close_count.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

impl FakeFeed {
    fn send(&self, topic: &str, payload: EventPayload) {
        let event = RuntimeEvent {
            topic: topic.to_owned(),
            namespace: "k8s.io".to_owned(),
            payload,
        };
        self.tx.send(Ok(Some(event))).unwrap();
    }

    pub(crate) fn task_start(&self, container_id: &str, pid: u32) {
        self.send(
            TASK_START_TOPIC,
            EventPayload::TaskStart {
                container_id: container_id.to_owned(),
                pid,
            },
        );
    }

    pub(crate) fn task_delete(&self, container_id: &str, pid: u32) {
        self.send(
            TASK_DELETE_TOPIC,
            EventPayload::TaskDelete {
                container_id: container_id.to_owned(),
                pid,
                exec_id: String::new(),
            },
        );
    }

    pub(crate) fn other(&self, topic: &str, type_url: &str) {
        self.send(
            topic,
            EventPayload::Other {
                type_url: type_url.to_owned(),
            },
        );
    }

    pub(crate) fn fail(&self) {
        self.tx
            .send(Err(Error::EventMessage(Box::new(tonic::Status::unavailable(
                "connection reset",
            )))))
            .unwrap();
    }
}

pub(crate) struct FakeSubscription {
    rx: mpsc::UnboundedReceiver<EventResult>,
}

impl EventSubscription for FakeSubscription {
    async fn next_event(&mut self) -> Result<Option<RuntimeEvent>> {
        match self.rx.recv().await {
            Some(event) => event,
            None => Ok(None),
        }
    }
}

impl RuntimeClient for FakeRuntime {
    type Subscription = FakeSubscription;

    async fn list_containers(&self) -> Result<Vec<ContainerDescriptor>> {
        self.ensure_open()?;
        let containers = self.state.containers.lock().unwrap();
        Ok(containers
            .iter()
            .map(|(id, labels)| ContainerDescriptor {
                id: id.clone(),
                labels: labels.clone(),
            })
            .collect())
    }

    async fn get_container(&self, id: &str) -> Result<Labels> {
        self.ensure_open()?;
        let delay = *self.state.lookup_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state
            .containers
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound { id: id.to_owned() })
    }

    async fn list_pids(&self, container_id: &str) -> Result<Vec<u32>> {
        self.ensure_open()?;
        self.state
            .pids
            .lock()
            .unwrap()
            .get(container_id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                id: container_id.to_owned(),
            })
    }

    async fn subscribe(&self, filters: Vec<String>) -> Result<FakeSubscription> {
        self.ensure_open()?;
        if self.state.fail_subscribe.load(Ordering::SeqCst) {
            return Err(Error::Subscribe(Box::new(tonic::Status::unavailable(
                "events service unavailable",
            ))));
        }
        *self.state.filters.lock().unwrap() = filters;
        let rx = self.state.feed.lock().unwrap().take().ok_or(Error::Closed)?;
        Ok(FakeSubscription { rx })
    }

    async fn close(&self) {
        if !self.state.closed.swap(true, Ordering::SeqCst) {
            self.state.close_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}
