use super::{Error, Result};
use crate::classifier::{Category, classify};
use crate::container::ContainerID;
use crate::error::ResultOkLogExt;
use crate::registry::Registry;
use crate::runtime::RuntimeClient;

/// Seeds the registry with the containers that already run processes.
///
/// Sandboxes and unknown entities are skipped, as are containers without a running task
/// or without any live process. Returns the number of containers added to the registry.
///
/// # Errors
///
/// Returns [`Error::Enumerate`] if the runtime cannot list its containers.
pub async fn reconcile<C: RuntimeClient>(client: &C, registry: &Registry) -> Result<usize> {
    let containers = client.list_containers().await.map_err(Error::Enumerate)?;
    log::debug!("Found {} existing entities", containers.len());

    let mut seeded = 0;
    for container in containers {
        let classification = classify(&container.labels);
        match classification.category {
            Category::Container | Category::KubernetesContainer => {}
            Category::Sandbox | Category::KubernetesSandbox | Category::Unknown => continue,
        }
        if classification.identity.is_none() {
            log::debug!("Container `{}` is not managed by Kubernetes", container.id);
        }

        let pids = match client.list_pids(&container.id).await {
            Ok(pids) if !pids.is_empty() => pids,
            Ok(_) => {
                log::debug!("Container `{}` has no live processes, skipping", container.id);
                continue;
            }
            Err(err) => {
                log::debug!(
                    "Container `{}` has no running task, skipping: {}",
                    container.id,
                    err
                );
                continue;
            }
        };

        let Some(id) = ContainerID::new(&container.id).ok_log() else {
            continue;
        };
        log::debug!("Container `{}` runs pids {:?}", id, pids);
        if registry
            .add_container_with_processes(id, &pids, classification.identity)
            .ok_log()
            .is_some()
        {
            seeded += 1;
        }
    }

    log::info!("Seeded registry with {} running containers", seeded);
    Ok(seeded)
}
