//! Generated types and clients for the subset of the containerd API used by the tracker.
//!
//! The module tree mirrors the protobuf packages below `containerd`, so the relative
//! paths emitted for cross-package references resolve within this module.
#![allow(clippy::derive_partial_eq_without_eq)]

pub mod events {
    tonic::include_proto!("containerd.events");
}

pub mod services {
    pub mod containers {
        pub mod v1 {
            tonic::include_proto!("containerd.services.containers.v1");
        }
    }
    pub mod events {
        pub mod v1 {
            tonic::include_proto!("containerd.services.events.v1");
        }
    }
    pub mod tasks {
        pub mod v1 {
            tonic::include_proto!("containerd.services.tasks.v1");
        }
    }
    pub mod namespaces {
        pub mod v1 {
            tonic::include_proto!("containerd.services.namespaces.v1");
        }
    }
    pub mod version {
        pub mod v1 {
            tonic::include_proto!("containerd.services.version.v1");
        }
    }
}

pub mod v1 {
    pub mod types {
        tonic::include_proto!("containerd.v1.types");
    }
}
