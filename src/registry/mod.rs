//! In-memory registry of live containers and their processes.
//!
//! The registry is written by a single task (startup reconciliation, then the event
//! loop) and may be read concurrently through [`Registry::snapshot`]. A container is only
//! tracked while it has at least one live process: removing its last process removes the
//! container as well.
use std::collections::HashSet;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::container::{ContainerID, ContainerRecord, ContainerStatus, KubernetesIdentity};
use crate::namespace::{NamespaceID, NamespaceResolver};

mod error;

pub use error::{Error, Result};

#[derive(Debug)]
struct ContainerState {
    status: ContainerStatus,
    pids: HashSet<u32>,
    first_pid: u32,
    namespace: Option<NamespaceID>,
    kubernetes: Option<KubernetesIdentity>,
}

impl ContainerState {
    fn new(first_pid: u32, kubernetes: Option<KubernetesIdentity>) -> Self {
        Self {
            status: ContainerStatus::Running,
            pids: HashSet::from([first_pid]),
            first_pid,
            namespace: None,
            kubernetes,
        }
    }

    /// Resolves the namespace from the first pid unless it is already known.
    ///
    /// Resolution failures leave the state untouched and are retried on the next mutation.
    fn try_resolve_namespace(&mut self, id: &ContainerID, resolver: &NamespaceResolver) -> Result<()> {
        if self.namespace.is_some() || self.pids.is_empty() {
            return Ok(());
        }
        if self.first_pid == 0 {
            return Err(Error::MissingFirstProcess { id: id.to_string() });
        }

        match resolver.resolve(self.first_pid) {
            Ok(namespace) => {
                log::debug!(
                    "Resolved pid namespace {} for container `{}` from pid {}",
                    namespace,
                    id,
                    self.first_pid
                );
                self.namespace = Some(namespace);
            }
            Err(err) => log::debug!(
                "Namespace of container `{}` is still unresolved: {}",
                id,
                err
            ),
        }

        Ok(())
    }

    fn to_record(&self, id: &ContainerID) -> ContainerRecord {
        let mut pids: Vec<u32> = self.pids.iter().copied().collect();
        pids.sort_unstable();
        ContainerRecord {
            id: id.clone(),
            status: self.status,
            pids,
            first_pid: self.first_pid,
            namespace: self.namespace,
            kubernetes: self.kubernetes.clone(),
        }
    }
}

/// Authoritative map from container id to container state.
#[derive(Debug)]
pub struct Registry {
    containers: DashMap<ContainerID, ContainerState>,
    resolver: NamespaceResolver,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(NamespaceResolver::default())
    }
}

impl Registry {
    pub fn new(resolver: NamespaceResolver) -> Self {
        Self {
            containers: DashMap::default(),
            resolver,
        }
    }

    /// Starts tracking a container that already runs the given processes.
    ///
    /// The first pid of `pids` is used to resolve the container's namespace.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyProcessList`] if `pids` is empty; the registry is left unchanged.
    /// - [`Error::DuplicateContainer`] if the container is already tracked.
    /// - [`Error::MissingFirstProcess`] if the first pid is `0`; the container is still tracked.
    pub fn add_container_with_processes(
        &self,
        id: ContainerID,
        pids: &[u32],
        kubernetes: Option<KubernetesIdentity>,
    ) -> Result<()> {
        let Some(&first_pid) = pids.first() else {
            return Err(Error::EmptyProcessList { id: id.to_string() });
        };

        match self.containers.entry(id) {
            Entry::Occupied(entry) => Err(Error::DuplicateContainer {
                id: entry.key().to_string(),
            }),
            Entry::Vacant(entry) => {
                let mut state = ContainerState::new(first_pid, kubernetes);
                state.pids.extend(pids.iter().copied());
                let mut entry = entry.insert(state);
                let (id, state) = entry.pair_mut();
                log::debug!("Tracking container `{}` with pids {:?}", id, pids);
                state.try_resolve_namespace(id, &self.resolver)
            }
        }
    }

    /// Adds a process to a container, tracking the container if it is unseen.
    ///
    /// Adding a pid that is already tracked is a no-op. The Kubernetes identity is only
    /// used when the container is created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingFirstProcess`] if the container's first pid is `0`.
    pub fn add_process(
        &self,
        id: ContainerID,
        pid: u32,
        kubernetes: Option<KubernetesIdentity>,
    ) -> Result<()> {
        let mut entry = match self.containers.entry(id) {
            Entry::Occupied(entry) => {
                let mut entry = entry.into_ref();
                if entry.pids.insert(pid) {
                    log::debug!("Added pid {} to container `{}`", pid, entry.key());
                }
                entry
            }
            Entry::Vacant(entry) => {
                log::debug!("Tracking new container `{}` with pid {}", entry.key(), pid);
                entry.insert(ContainerState::new(pid, kubernetes))
            }
        };

        let (id, state) = entry.pair_mut();
        state.try_resolve_namespace(id, &self.resolver)
    }

    /// Removes a process from a container.
    ///
    /// If this was the container's last process the container is no longer tracked.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownContainer`] if the container is not tracked.
    /// - [`Error::UnknownProcess`] if `pid` is not tracked for the container.
    pub fn remove_process(&self, id: &str, pid: u32) -> Result<()> {
        let emptied = {
            let mut entry = self
                .containers
                .get_mut(id)
                .ok_or_else(|| Error::UnknownContainer { id: id.to_owned() })?;
            if !entry.pids.remove(&pid) {
                return Err(Error::UnknownProcess {
                    id: id.to_owned(),
                    pid,
                });
            }
            if entry.pids.is_empty() {
                true
            } else {
                let (id, state) = entry.pair_mut();
                state.try_resolve_namespace(id, &self.resolver)?;
                false
            }
        };

        if emptied {
            self.containers.remove(id);
            log::debug!("Container `{}` has no processes left, untracking it", id);
        }

        Ok(())
    }

    /// Stops tracking a container regardless of its processes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownContainer`] if the container is not tracked.
    pub fn remove_container(&self, id: &str) -> Result<()> {
        self.containers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::UnknownContainer { id: id.to_owned() })
    }

    pub fn get(&self, id: &str) -> Option<ContainerRecord> {
        self.containers
            .get(id)
            .map(|entry| entry.value().to_record(entry.key()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.containers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Returns a view of all tracked containers, ordered by id.
    pub fn snapshot(&self) -> Vec<ContainerRecord> {
        let mut records: Vec<ContainerRecord> = self
            .containers
            .iter()
            .map(|entry| entry.value().to_record(entry.key()))
            .collect();
        records.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Logs the current contents of the registry at debug level.
    pub fn log_snapshot(&self) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        let records = self.snapshot();
        if records.is_empty() {
            log::debug!("Registry is empty, no running containers");
            return;
        }
        for record in records {
            let namespace = record
                .namespace
                .map_or_else(|| "[UNKNOWN]".to_owned(), |ns| ns.to_string());
            log::debug!(
                "container={} pids={:?} pid_namespace={}",
                record.id,
                record.pids,
                namespace
            );
            if let Some(k8s) = record.kubernetes {
                log::debug!(
                    "  pod={} pod_namespace={} container_name={}",
                    k8s.pod_name,
                    k8s.pod_namespace,
                    k8s.container_name
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn id(raw: &str) -> ContainerID {
        ContainerID::new(raw).unwrap()
    }

    #[cfg(target_family = "unix")]
    fn link_namespace(proc_root: &Path, pid: u32, ns: u64) {
        let ns_dir = proc_root.join(format!("{pid}/ns"));
        std::fs::create_dir_all(&ns_dir).unwrap();
        let link = ns_dir.join("pid");
        let _ = std::fs::remove_file(&link);
        std::os::unix::fs::symlink(format!("pid:[{ns}]"), link).unwrap();
    }

    fn empty_registry() -> (tempfile::TempDir, Registry) {
        let proc_root = tempfile::tempdir().unwrap();
        let registry = Registry::new(NamespaceResolver::new(proc_root.path()));
        (proc_root, registry)
    }

    fn k8s() -> KubernetesIdentity {
        KubernetesIdentity {
            pod_name: "web-0".into(),
            pod_namespace: "default".into(),
            container_name: "nginx".into(),
        }
    }

    #[test]
    fn test_add_container_with_processes() {
        let (_proc, registry) = empty_registry();
        registry
            .add_container_with_processes(id("c1"), &[101, 100], Some(k8s()))
            .unwrap();

        let record = registry.get("c1").unwrap();
        assert_eq!(record.pids, vec![100, 101]);
        assert_eq!(record.first_pid, 101);
        assert_eq!(record.status, ContainerStatus::Running);
        assert_eq!(record.kubernetes, Some(k8s()));
        assert_eq!(record.namespace, None);
    }

    #[test]
    fn test_add_container_with_empty_process_list_fails() {
        let (_proc, registry) = empty_registry();
        let err = registry
            .add_container_with_processes(id("c1"), &[], None)
            .unwrap_err();
        assert_eq!(err, Error::EmptyProcessList { id: "c1".into() });
        assert!(registry.is_empty());

        registry.add_process(id("c2"), 7, None).unwrap();
        let before = registry.snapshot();
        assert!(
            registry
                .add_container_with_processes(id("c2"), &[], None)
                .is_err()
        );
        assert_eq!(registry.snapshot(), before);
    }

    #[test]
    fn test_add_container_twice_fails() {
        let (_proc, registry) = empty_registry();
        registry
            .add_container_with_processes(id("c1"), &[100], None)
            .unwrap();
        let err = registry
            .add_container_with_processes(id("c1"), &[200], None)
            .unwrap_err();
        assert_eq!(err, Error::DuplicateContainer { id: "c1".into() });
        assert_eq!(registry.get("c1").unwrap().pids, vec![100]);
    }

    #[test]
    fn test_add_process_creates_unseen_container() {
        let (_proc, registry) = empty_registry();
        registry.add_process(id("c2"), 200, None).unwrap();

        let record = registry.get("c2").unwrap();
        assert_eq!(record.pids, vec![200]);
        assert_eq!(record.first_pid, 200);
        assert_eq!(record.kubernetes, None);
    }

    #[test]
    fn test_add_process_is_idempotent() {
        let (_proc, registry) = empty_registry();
        registry.add_process(id("c1"), 100, None).unwrap();
        registry.add_process(id("c1"), 101, None).unwrap();
        let before = registry.snapshot();

        registry.add_process(id("c1"), 101, None).unwrap();
        assert_eq!(registry.snapshot(), before);
    }

    #[test]
    fn test_add_process_keeps_creation_identity() {
        let (_proc, registry) = empty_registry();
        registry.add_process(id("c1"), 100, None).unwrap();
        registry.add_process(id("c1"), 101, Some(k8s())).unwrap();
        assert_eq!(registry.get("c1").unwrap().kubernetes, None);
    }

    #[test]
    fn test_remove_last_process_removes_container() {
        let (_proc, registry) = empty_registry();
        registry.add_process(id("c2"), 200, None).unwrap();
        registry.remove_process("c2", 200).unwrap();
        assert!(!registry.contains("c2"));

        let err = registry.remove_process("c2", 200).unwrap_err();
        assert_eq!(err, Error::UnknownContainer { id: "c2".into() });
    }

    #[test]
    fn test_remove_unknown_process_fails() {
        let (_proc, registry) = empty_registry();
        registry
            .add_container_with_processes(id("c1"), &[100, 101], None)
            .unwrap();
        let err = registry.remove_process("c1", 999).unwrap_err();
        assert_eq!(
            err,
            Error::UnknownProcess {
                id: "c1".into(),
                pid: 999
            }
        );
        assert_eq!(registry.get("c1").unwrap().pids, vec![100, 101]);
    }

    #[test]
    fn test_remove_container() {
        let (_proc, registry) = empty_registry();
        registry
            .add_container_with_processes(id("c1"), &[100, 101], None)
            .unwrap();
        registry.remove_container("c1").unwrap();
        assert!(registry.is_empty());
        assert_eq!(
            registry.remove_container("c1").unwrap_err(),
            Error::UnknownContainer { id: "c1".into() }
        );
    }

    #[test]
    fn test_zero_first_pid_is_reported_without_losing_state() {
        let (_proc, registry) = empty_registry();
        let err = registry
            .add_container_with_processes(id("c1"), &[0, 5], None)
            .unwrap_err();
        assert_eq!(err, Error::MissingFirstProcess { id: "c1".into() });

        let record = registry.get("c1").unwrap();
        assert_eq!(record.pids, vec![0, 5]);
        assert_eq!(record.namespace, None);
    }

    #[test]
    fn test_snapshot_is_ordered_by_id() {
        let (_proc, registry) = empty_registry();
        registry.add_process(id("b"), 2, None).unwrap();
        registry.add_process(id("c"), 3, None).unwrap();
        registry.add_process(id("a"), 1, None).unwrap();

        let ids: Vec<String> = registry
            .snapshot()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    #[cfg(target_family = "unix")]
    fn test_namespace_resolved_on_creation() {
        let (proc_root, registry) = empty_registry();
        link_namespace(proc_root.path(), 100, 4026532001);

        registry
            .add_container_with_processes(id("c1"), &[100, 101], None)
            .unwrap();
        assert_eq!(
            registry.get("c1").unwrap().namespace,
            Some(NamespaceID::new(4026532001))
        );
    }

    #[test]
    #[cfg(target_family = "unix")]
    fn test_namespace_resolution_retried_on_next_mutation() {
        let (proc_root, registry) = empty_registry();
        registry.add_process(id("c1"), 100, None).unwrap();
        assert_eq!(registry.get("c1").unwrap().namespace, None);

        link_namespace(proc_root.path(), 100, 4026532002);
        registry.add_process(id("c1"), 101, None).unwrap();
        assert_eq!(
            registry.get("c1").unwrap().namespace,
            Some(NamespaceID::new(4026532002))
        );
    }

    #[test]
    #[cfg(target_family = "unix")]
    fn test_namespace_never_changes_once_resolved() {
        let (proc_root, registry) = empty_registry();
        link_namespace(proc_root.path(), 100, 4026532003);
        registry
            .add_container_with_processes(id("c1"), &[100, 101], None)
            .unwrap();

        // the first process exits and its pid is reused in another namespace
        registry.remove_process("c1", 100).unwrap();
        std::fs::remove_dir_all(proc_root.path().join("100")).unwrap();
        registry.add_process(id("c1"), 102, None).unwrap();
        link_namespace(proc_root.path(), 100, 4026539999);
        registry.add_process(id("c1"), 103, None).unwrap();

        let record = registry.get("c1").unwrap();
        assert_eq!(record.first_pid, 100);
        assert_eq!(record.namespace, Some(NamespaceID::new(4026532003)));
    }

    #[test]
    fn test_no_tracked_container_is_ever_empty() {
        let (_proc, registry) = empty_registry();
        let ids = ["a", "b", "c"];
        // small linear congruential generator for a reproducible operation sequence
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as u32
        };

        for _ in 0..2_000 {
            let container = ids[(next() % 3) as usize];
            let pid = next() % 6 + 1;
            if next() % 2 == 0 {
                registry.add_process(id(container), pid, None).unwrap();
            } else {
                let _ = registry.remove_process(container, pid);
            }
            assert!(registry.snapshot().iter().all(|r| !r.pids.is_empty()));
        }
    }
}
