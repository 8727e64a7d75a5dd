use clap::Parser;

/// Entry point for the cdtrack container tracker.
///
/// Connects to containerd, lists the containers that are already running and keeps
/// tracking their processes from containerd's task events.
///
/// # Errors
///
/// Returns an error if initialization fails (e.g., containerd is unreachable or the host
/// root mount is missing inside a container).
///
/// # Examples
///
/// ```bash
/// RUST_LOG=info cargo run -- --namespace k8s.io
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = cdtrack::config::Args::parse();
    cdtrack::run(args).await
}
