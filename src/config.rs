use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};

use crate::monitor::MonitorConfig;

pub const DEFAULT_SOCKET_PATH: &str = "/run/containerd/containerd.sock";
pub const DEFAULT_NAMESPACE: &str = "k8s.io";
pub const DEFAULT_API_HOST: &str = "0.0.0.0";
pub const DEFAULT_API_PORT: u16 = 10080;

/// Tracks containerd containers and the processes running in them
///
/// Options backed by an environment variable take the flag when both are given; the
/// variable only replaces the default.
#[derive(Parser, Debug, Clone)]
#[command(name = "cdtrack", version)]
pub struct Args {
    /// Path to the containerd socket
    #[arg(short = 'p', long = "socket", env = "CONTAINERD_SOCK_PATH", default_value = DEFAULT_SOCKET_PATH)]
    pub socket_path: PathBuf,

    /// containerd namespace to track
    #[arg(short, long, env = "CONTAINERD_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Watch for changes after listing the running containers
    #[arg(short, long, default_value_t = true, action = ArgAction::Set)]
    pub watch: bool,

    /// List the containerd namespaces and exit
    #[arg(long)]
    pub list_namespaces: bool,

    /// Mount point of the host root filesystem when running in a container
    #[arg(long, env = "ROOTFS_MOUNT_PATH", default_value = "/rootfs")]
    pub rootfs: PathBuf,

    /// Deadline in milliseconds for looking up the container of an event
    #[arg(long, default_value_t = 5000)]
    pub lookup_timeout_ms: u64,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve an HTTP API to start and stop the tracker
    Serve {
        #[arg(long, default_value = DEFAULT_API_HOST)]
        host: String,
        #[arg(long, default_value_t = DEFAULT_API_PORT)]
        port: u16,
    },
}

impl Args {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            lookup_timeout: Duration::from_millis(self.lookup_timeout_ms),
        }
    }
}
