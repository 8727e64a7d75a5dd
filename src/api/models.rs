use crate::container::ContainerRecord;
use crate::monitor::MonitorState;

#[derive(Debug, serde::Serialize)]
pub struct StatusMessage {
    pub message: String,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TrackedContainers {
    pub state: MonitorState,
    pub dropped_events: u64,
    pub containers: Vec<ContainerRecord>,
}
