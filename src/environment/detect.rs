use std::path::{Path, PathBuf};

use super::checks::{
    contains_proc_mount, has_container_indicators, is_pid_namespace_isolated,
    matches_container_cgroup,
};

/// Available runtime environments for the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnvironment {
    /// Running directly on the host.
    Host,
    /// Running inside a containerized environment (e.g., Docker, Kubernetes, Podman).
    Container,
}

/// Detects whether the current system is running in a container or on the host.
///
/// The checks run in order until one of them detects a container:
///
/// 1. `rootfs` contains a procfs whose init process lives in another pid namespace.
/// 2. `/proc/self/cgroup` contains container-related patterns.
/// 3. Known container marker files or environment variables exist.
///
/// Failing checks are logged as warnings and treated as inconclusive.
pub fn detect_runtime_environment(rootfs: impl AsRef<Path>) -> RuntimeEnvironment {
    let rootfs = rootfs.as_ref();
    match contains_proc_mount(rootfs) {
        Ok(true) => match is_pid_namespace_isolated(rootfs) {
            Ok(true) => return RuntimeEnvironment::Container,
            Ok(false) => {}
            Err(err) => log::warn!(
                "Namespace check failed when detecting runtime environment: {}",
                err
            ),
        },
        Ok(false) => {}
        Err(err) => log::warn!("Failed to determine presence of /proc in rootfs: {}", err),
    }

    match matches_container_cgroup() {
        Ok(true) => return RuntimeEnvironment::Container,
        Ok(false) => {}
        Err(err) => log::warn!("Cgroup analysis failed during runtime detection: {}", err),
    }

    if has_container_indicators() {
        return RuntimeEnvironment::Container;
    }

    RuntimeEnvironment::Host
}

/// Returns the procfs mount exposing the host's processes.
///
/// Inside a container the host root is expected to be mounted at `rootfs`; `None` is
/// returned if it is missing.
pub fn host_proc_root(environment: RuntimeEnvironment, rootfs: &Path) -> Option<PathBuf> {
    match environment {
        RuntimeEnvironment::Host => Some(PathBuf::from("/proc")),
        RuntimeEnvironment::Container if rootfs.exists() => Some(rootfs.join("proc")),
        RuntimeEnvironment::Container => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_proc_root() {
        assert_eq!(
            host_proc_root(RuntimeEnvironment::Host, Path::new("/does/not/matter")),
            Some(PathBuf::from("/proc"))
        );
    }

    #[test]
    fn test_container_proc_root() {
        let rootfs = tempfile::tempdir().unwrap();
        assert_eq!(
            host_proc_root(RuntimeEnvironment::Container, rootfs.path()),
            Some(rootfs.path().join("proc"))
        );
        assert_eq!(
            host_proc_root(
                RuntimeEnvironment::Container,
                &rootfs.path().join("missing")
            ),
            None
        );
    }
}
