use std::path::PathBuf;

/// Errors reported by a [`RuntimeClient`](super::RuntimeClient).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to socket `{path}`: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("invalid runtime namespace `{namespace}`")]
    InvalidNamespace { namespace: String },
    #[error("runtime call `{operation}` failed: {source}")]
    Rpc {
        operation: &'static str,
        #[source]
        source: Box<tonic::Status>,
    },
    #[error("container `{id}` not found")]
    NotFound { id: String },
    #[error("runtime connection is closed")]
    Closed,
    #[error("failed to subscribe to events service: {0}")]
    Subscribe(#[source] Box<tonic::Status>),
    #[error("failed to receive event message: {0}")]
    EventMessage(#[source] Box<tonic::Status>),
}

impl Error {
    /// Wraps a failed gRPC call, mapping `NotFound` statuses to [`Error::NotFound`].
    pub(crate) fn from_status(operation: &'static str, id: &str, status: tonic::Status) -> Self {
        if status.code() == tonic::Code::NotFound {
            Error::NotFound { id: id.to_owned() }
        } else {
            Error::Rpc {
                operation,
                source: Box::new(status),
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
