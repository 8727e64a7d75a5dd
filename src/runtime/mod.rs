//! Interface to the container runtime.
//!
//! The tracker only needs a handful of primitives from the runtime: enumerate containers
//! with their labels, look up one container, list the pids of a container's task and
//! subscribe to lifecycle events. [`crate::containerd::ContainerdClient`] implements them
//! on top of the containerd gRPC API.
use std::collections::HashMap;

mod error;
#[cfg(test)]
pub(crate) mod fake;

pub use error::{Error, Result};

/// Labels attached to a runtime entity.
pub type Labels = HashMap<String, String>;

pub const TASK_START_TOPIC: &str = "/tasks/start";
pub const TASK_DELETE_TOPIC: &str = "/tasks/delete";

/// Builds an event filter matching a single topic, e.g. `topic=="/tasks/start"`.
pub fn topic_filter(topic: &str) -> String {
    format!(r#"topic=="{topic}""#)
}

/// A container as reported by the runtime's container service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescriptor {
    pub id: String,
    pub labels: Labels,
}

/// Typed payload of a runtime event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    TaskStart {
        container_id: String,
        pid: u32,
    },
    TaskDelete {
        container_id: String,
        pid: u32,
        /// Empty when the container's init process was deleted.
        exec_id: String,
    },
    /// An event type the tracker does not handle.
    Other { type_url: String },
    /// The envelope carried no payload.
    Empty,
}

/// One event delivered by the runtime's event feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEvent {
    pub topic: String,
    pub namespace: String,
    pub payload: EventPayload,
}

/// Connection to a container runtime.
pub trait RuntimeClient: Send + Sync + 'static {
    type Subscription: EventSubscription;

    fn list_containers(&self) -> impl Future<Output = Result<Vec<ContainerDescriptor>>> + Send;

    /// Returns the labels of a single container, or [`Error::NotFound`].
    fn get_container(&self, id: &str) -> impl Future<Output = Result<Labels>> + Send;

    /// Returns the pids of the processes running in the container's task.
    fn list_pids(&self, container_id: &str) -> impl Future<Output = Result<Vec<u32>>> + Send;

    /// Subscribes to events matching any of the given filters.
    fn subscribe(
        &self,
        filters: Vec<String>,
    ) -> impl Future<Output = Result<Self::Subscription>> + Send;

    /// Closes the connection. Every later call fails with [`Error::Closed`].
    ///
    /// Closing an already closed client is a no-op.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// A live event feed.
pub trait EventSubscription: Send + 'static {
    /// Waits for the next event.
    ///
    /// Returns `Ok(None)` once the feed has ended. Errors are terminal for the feed.
    fn next_event(&mut self) -> impl Future<Output = Result<Option<RuntimeEvent>>> + Send;
}
