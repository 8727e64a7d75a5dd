use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Error that occurs when opening a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to open file `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Error that occurs when reading the target of a symbolic link fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to read symlink `{path}`: {source}")]
pub struct ReadLinkError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the file cannot be opened.
///
/// # Example
/// ```no_run
/// # use cdtrack::fsutil;
/// let reader = fsutil::open_file_reader("/proc/self/cgroup")?;
/// # Ok::<(), fsutil::FileOpenError>(())
/// ```
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileOpenError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Reads the textual target of the symbolic link at `path`.
///
/// Link targets under `/proc/<pid>/ns` are not real paths (e.g. `pid:[4026531836]`), so
/// the target is returned lossily as a `String`.
///
/// # Errors
///
/// Returns a [`ReadLinkError`] if the link does not exist or cannot be read.
pub fn read_link_text(path: impl AsRef<Path>) -> Result<String, ReadLinkError> {
    let path = path.as_ref();
    let target = std::fs::read_link(path).map_err(|source| ReadLinkError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(target.to_string_lossy().into_owned())
}
