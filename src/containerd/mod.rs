//! containerd implementation of [`RuntimeClient`](crate::runtime::RuntimeClient).
//!
//! Only the handful of containerd API messages the tracker uses are declared in [`api`];
//! unknown fields sent by the daemon are skipped by prost while decoding.
pub mod api;
mod client;
mod events;

pub use client::{ContainerdClient, ContainerdSubscription, list_namespaces};
pub use events::{DecodeError, decode_event};
