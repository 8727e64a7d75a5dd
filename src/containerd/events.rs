use prost::Message;
use prost_types::Any;

use super::api::events::{TaskDelete, TaskStart};
use super::api::services::events::v1::Envelope;
use crate::runtime::{EventPayload, RuntimeEvent};

const TASK_START_TYPE: &str = "containerd.events.TaskStart";
const TASK_DELETE_TYPE: &str = "containerd.events.TaskDelete";

#[derive(Debug, thiserror::Error)]
#[error("failed to decode event type `{type_url}`: {source}")]
pub struct DecodeError {
    pub type_url: String,
    #[source]
    pub source: prost::DecodeError,
}

/// Decodes the payload of an event.
///
/// Event types other than task start/delete are returned as [`EventPayload::Other`].
///
/// # Errors
///
/// Returns a [`DecodeError`] if a known event type carries a malformed payload.
pub fn decode_event(event: &Any) -> Result<EventPayload, DecodeError> {
    // containerd omits the `type.googleapis.com/` prefix, other producers may not
    let type_url = event
        .type_url
        .rsplit_once('/')
        .map_or(event.type_url.as_str(), |(_, name)| name);
    let map_err = |source| DecodeError {
        type_url: event.type_url.clone(),
        source,
    };

    let payload = match type_url {
        TASK_START_TYPE => {
            let start = TaskStart::decode(event.value.as_slice()).map_err(map_err)?;
            EventPayload::TaskStart {
                container_id: start.container_id,
                pid: start.pid,
            }
        }
        TASK_DELETE_TYPE => {
            let delete = TaskDelete::decode(event.value.as_slice()).map_err(map_err)?;
            EventPayload::TaskDelete {
                container_id: delete.container_id,
                pid: delete.pid,
                exec_id: delete.id,
            }
        }
        _ => EventPayload::Other {
            type_url: event.type_url.clone(),
        },
    };

    Ok(payload)
}

/// Converts a received envelope into a [`RuntimeEvent`].
pub(super) fn decode_envelope(envelope: Envelope) -> Result<RuntimeEvent, DecodeError> {
    let payload = match envelope.event {
        Some(ref event) => decode_event(event)?,
        None => EventPayload::Empty,
    };

    Ok(RuntimeEvent {
        topic: envelope.topic,
        namespace: envelope.namespace,
        payload,
    })
}
