use std::fmt;
use std::path::{Path, PathBuf};

use super::{Error, Result};
use crate::fsutil;

/// Namespace kind resolved for containers.
const PID_NAMESPACE: &str = "pid";

/// Identifier (inode number) of a kernel namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct NamespaceID(u64);

impl NamespaceID {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NamespaceID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolves namespace ids of processes through a procfs mount.
///
/// The procfs root is configurable so the tracker can read the host's `/proc` while
/// running inside a container (`/rootfs/proc`).
#[derive(Debug, Clone)]
pub struct NamespaceResolver {
    proc_root: PathBuf,
}

impl Default for NamespaceResolver {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl NamespaceResolver {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    /// Resolves the pid namespace of the process `pid`.
    ///
    /// This performs blocking filesystem I/O.
    ///
    /// # Errors
    ///
    /// - [`Error::ProcessNotFound`] if the process no longer exists.
    /// - [`Error::ReadLink`] if the link exists but cannot be read.
    /// - [`Error::Format`] or [`Error::InvalidNumber`] if the link target is malformed.
    pub fn resolve(&self, pid: u32) -> Result<NamespaceID> {
        self.resolve_kind(pid, PID_NAMESPACE)
    }

    /// Resolves the namespace of the given `kind` (`pid`, `net`, `mnt`, ...) of process `pid`.
    pub fn resolve_kind(&self, pid: u32, kind: &str) -> Result<NamespaceID> {
        let path = self.proc_root.join(format!("{pid}/ns/{kind}"));
        let link = fsutil::read_link_text(&path).map_err(|err| {
            if err.source.kind() == std::io::ErrorKind::NotFound {
                Error::ProcessNotFound {
                    pid,
                    path: err.path,
                }
            } else {
                Error::ReadLink { pid, source: err }
            }
        })?;
        log::trace!("namespace link of process {pid}: {link}");
        parse_namespace_link(&link)
    }
}

/// Parses a namespace link target of the shape `<kind>:[<id>]`.
///
/// # Errors
///
/// Returns [`Error::Format`] if the brackets or the kind are missing and
/// [`Error::InvalidNumber`] if the id is not an unsigned decimal integer.
///
/// # Examples
///
/// ```
/// # use cdtrack::namespace::parse_namespace_link;
/// let id = parse_namespace_link("pid:[4026531836]").unwrap();
/// assert_eq!(id.as_raw(), 4026531836);
/// ```
pub fn parse_namespace_link(link: &str) -> Result<NamespaceID> {
    let (kind, rest) = link
        .split_once(":[")
        .ok_or_else(|| Error::Format(link.to_owned()))?;
    if kind.is_empty() {
        return Err(Error::Format(link.to_owned()));
    }
    let digits = rest
        .strip_suffix(']')
        .ok_or_else(|| Error::Format(link.to_owned()))?;
    let id = digits
        .parse::<u64>()
        .map_err(|source| Error::InvalidNumber {
            link: link.to_owned(),
            source,
        })?;

    Ok(NamespaceID(id))
}
