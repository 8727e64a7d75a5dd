//! Classification of runtime entities from their labels.
//!
//! The CRI plugin of containerd marks every entity it creates with a kind label
//! (`container` or `sandbox`) and, for pods, with the Kubernetes pod and container names.
//! Entities without a kind label (images, snapshots, internal bookkeeping in the
//! runtime's own namespace) are classified as [`Category::Unknown`].
use std::collections::HashMap;

use crate::container::KubernetesIdentity;

pub const CONTAINER_KIND_LABEL: &str = "io.cri-containerd.kind";
pub const POD_NAME_LABEL: &str = "io.kubernetes.pod.name";
pub const POD_NAMESPACE_LABEL: &str = "io.kubernetes.pod.namespace";
pub const CONTAINER_NAME_LABEL: &str = "io.kubernetes.container.name";

const KIND_CONTAINER: &str = "container";
const KIND_SANDBOX: &str = "sandbox";

/// Category of a runtime entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Container,
    Sandbox,
    KubernetesContainer,
    KubernetesSandbox,
    Unknown,
}

/// Result of classifying an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    /// Present exactly when `category` is a Kubernetes variant.
    pub identity: Option<KubernetesIdentity>,
}

impl Classification {
    fn unknown() -> Self {
        Self {
            category: Category::Unknown,
            identity: None,
        }
    }
}

/// Classifies an entity from its labels.
///
/// The Kubernetes identity is all-or-nothing: unless the pod name, pod namespace and
/// container name labels are all present, the entity is not considered Kubernetes-managed.
///
/// # Examples
///
/// ```
/// # use std::collections::HashMap;
/// # use cdtrack::classifier::{classify, Category, CONTAINER_KIND_LABEL};
/// let labels = HashMap::from([(CONTAINER_KIND_LABEL.to_owned(), "sandbox".to_owned())]);
/// assert_eq!(classify(&labels).category, Category::Sandbox);
/// ```
pub fn classify(labels: &HashMap<String, String>) -> Classification {
    let is_container = match labels.get(CONTAINER_KIND_LABEL).map(String::as_str) {
        Some(KIND_CONTAINER) => true,
        Some(KIND_SANDBOX) => false,
        _ => return Classification::unknown(),
    };

    let identity = kubernetes_identity(labels);
    let category = match (is_container, identity.is_some()) {
        (true, false) => Category::Container,
        (true, true) => Category::KubernetesContainer,
        (false, false) => Category::Sandbox,
        (false, true) => Category::KubernetesSandbox,
    };

    Classification { category, identity }
}

/// Extracts the Kubernetes identity if all three identity labels are present.
pub fn kubernetes_identity(labels: &HashMap<String, String>) -> Option<KubernetesIdentity> {
    Some(KubernetesIdentity {
        pod_name: labels.get(POD_NAME_LABEL)?.clone(),
        pod_namespace: labels.get(POD_NAMESPACE_LABEL)?.clone(),
        container_name: labels.get(CONTAINER_NAME_LABEL)?.clone(),
    })
}
