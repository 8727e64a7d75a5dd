use std::io::BufRead;
use std::path::Path;
use std::{env, fs};

use super::{Error, Result};
use crate::fsutil;
use crate::namespace::NamespaceResolver;

/// Markers in `/proc/self/cgroup` left by common container engines.
const CGROUP_CONTAINER_MARKERS: [&str; 4] = ["docker", "kubepods", "containerd", "libpod"];

/// Returns true if the given rootfs path contains a `proc` directory.
///
/// # Errors
///
/// Returns [`Error::ExistenceCheck`] if checking the existence of the directory fails.
pub fn contains_proc_mount(rootfs: impl AsRef<Path>) -> Result<bool> {
    let path = rootfs.as_ref().join("proc");

    path.try_exists()
        .map_err(|source| Error::ExistenceCheck { path, source })
}

/// Returns true if the pid namespace of this process differs from the one of the init
/// process found under `rootfs`.
///
/// # Errors
///
/// Returns [`Error::Namespace`] if either namespace cannot be resolved.
pub fn is_pid_namespace_isolated(rootfs: impl AsRef<Path>) -> Result<bool> {
    let own = NamespaceResolver::default().resolve(std::process::id())?;
    let init = NamespaceResolver::new(rootfs.as_ref().join("proc")).resolve(1)?;
    log::debug!("pid namespace of tracker: {own}, of host init: {init}");

    Ok(own != init)
}

/// Returns true if the cgroup membership of this process suggests a container.
///
/// # Errors
///
/// - [`Error::FileOpen`] if `/proc/self/cgroup` cannot be opened.
/// - [`Error::ReadLine`] if a line from the file cannot be read.
pub fn matches_container_cgroup() -> Result<bool> {
    let path = Path::new("/proc/self/cgroup");
    let reader = fsutil::open_file_reader(path)?;

    for line in reader.lines() {
        let line = line.map_err(|source| Error::ReadLine {
            path: path.to_path_buf(),
            source,
        })?;
        if is_container_cgroup_line(&line) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Returns true if known container marker files or variables exist.
pub fn has_container_indicators() -> bool {
    fs::metadata("/.dockerenv").is_ok()
        || fs::metadata("/run/.containerenv").is_ok()
        || env::var("container").is_ok()
}

fn is_container_cgroup_line(line: &str) -> bool {
    CGROUP_CONTAINER_MARKERS
        .iter()
        .any(|marker| line.contains(marker))
        || line
            .split('/')
            .any(|part| part.len() >= 32 && part.chars().all(|c| c.is_ascii_hexdigit()))
}
