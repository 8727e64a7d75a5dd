/// Violations of the registry invariants.
///
/// When produced while applying runtime events these usually mean the event feed
/// delivered events out of order or the tracker attached after a container started.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("container `{id}` is already tracked")]
    DuplicateContainer { id: String },
    #[error("container `{id}` cannot be tracked without any process")]
    EmptyProcessList { id: String },
    #[error("container `{id}` is unknown")]
    UnknownContainer { id: String },
    #[error("process {pid} is not tracked for container `{id}`")]
    UnknownProcess { id: String, pid: u32 },
    #[error("container `{id}` has processes but no first pid to resolve its namespace from")]
    MissingFirstProcess { id: String },
}

pub type Result<T> = std::result::Result<T, Error>;
