use std::path::PathBuf;

/// Errors that may occur while resolving the namespace of a process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("process {pid} does not exist (no namespace link at `{path}`)")]
    ProcessNotFound { pid: u32, path: PathBuf },
    #[error("failed to read namespace link of process {pid}: {source}")]
    ReadLink {
        pid: u32,
        #[source]
        source: crate::fsutil::ReadLinkError,
    },
    #[error("namespace link `{0}` does not match `<kind>:[<id>]`")]
    Format(String),
    #[error("invalid namespace id in link `{link}`: {source}")]
    InvalidNumber {
        link: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
