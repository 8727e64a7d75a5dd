//! Environment detection module.
//!
//! Determines whether the tracker runs on the host or inside a container, which decides
//! where the host's procfs is found.
mod checks;
mod detect;
mod error;

pub use detect::{RuntimeEnvironment, detect_runtime_environment, host_proc_root};
pub use error::{Error, Result};
