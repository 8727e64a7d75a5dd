use std::time::Duration;

use crate::runtime;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("event monitor is already running")]
    AlreadyRunning,
    #[error("event monitor is already stopped")]
    AlreadyStopped,
    #[error("event monitor is not running")]
    NotRunning,
    #[error("failed to enumerate existing containers: {0}")]
    Enumerate(#[source] runtime::Error),
    #[error("failed to subscribe to runtime events: {0}")]
    Subscribe(#[source] runtime::Error),
    #[error("runtime event feed failed: {0}")]
    EventStream(#[source] runtime::Error),
    #[error("runtime event feed was closed")]
    FeedClosed,
    #[error("failed to look up container `{id}`: {source}")]
    Lookup {
        id: String,
        #[source]
        source: runtime::Error,
    },
    #[error("looking up container `{id}` timed out after {timeout:?}")]
    LookupTimeout { id: String, timeout: Duration },
}

pub type Result<T> = std::result::Result<T, Error>;
