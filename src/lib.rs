//! cdtrack: tracks the containers of a containerd namespace and the processes running in
//! them.
//!
//! The tracker seeds an in-memory registry from the containers that are already running and
//! keeps it up to date from containerd's `/tasks/start` and `/tasks/delete` events. Each
//! container is annotated with the pid namespace of its first process and, for Kubernetes
//! workloads, with its pod identity.
use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{Mutex, mpsc};

use config::{Args, Command};
use error::{Error, ResultOkLogExt};
use namespace::NamespaceResolver;
use runtime::RuntimeClient;
use tracker::Tracker;

pub mod api;
pub mod classifier;
pub mod config;
pub mod container;
pub mod containerd;
pub mod environment;
pub mod error;
pub mod fsutil;
pub mod grpc;
pub mod monitor;
pub mod namespace;
pub mod registry;
pub mod runtime;
pub mod tracker;

/// Runs the tracker as configured by `args`.
///
/// Without a subcommand the tracker watches events until SIGINT or SIGTERM is received.
/// With `serve` it exposes an HTTP API to start and stop watching instead.
///
/// # Errors
///
/// Possible errors include:
/// - The host root mount is missing while running inside a container.
/// - containerd cannot be reached or its containers cannot be listed.
/// - The HTTP API cannot bind its address.
pub async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    if args.list_namespaces {
        for namespace in containerd::list_namespaces(&args.socket_path).await? {
            println!("{namespace}");
        }
        return Ok(());
    }

    let runtime_env = environment::detect_runtime_environment(&args.rootfs);
    log::debug!("Detected runtime environment: {:?}", runtime_env);
    let proc_root = environment::host_proc_root(runtime_env, &args.rootfs)
        .ok_or_else(|| Error::MissingRootfs(args.rootfs.clone()))?;
    log::debug!("Final proc root: {}", proc_root.display());

    let tracker = Tracker::connect(
        &args.socket_path,
        &args.namespace,
        NamespaceResolver::new(proc_root),
        args.monitor_config(),
    )
    .await?;

    if !args.watch {
        return Ok(());
    }

    match args.command {
        Some(Command::Serve { host, port }) => serve(tracker, &format!("{host}:{port}")).await?,
        None => watch(tracker).await?,
    }

    Ok(())
}

async fn watch<C: RuntimeClient>(mut tracker: Tracker<C>) -> error::Result<()> {
    let mut errors = tracker.errors();
    tracker.start()?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            Some(err) = next_error(&mut errors) => {
                log::error!("Event monitor failed: {}", err);
            }
        }
    }

    log::info!("Stopping tracker");
    tracker.stop().await.ok_log_at(log::Level::Warn);
    Ok(())
}

async fn serve<C: RuntimeClient>(mut tracker: Tracker<C>, addr: &str) -> error::Result<()> {
    if let Some(mut errors) = tracker.errors() {
        tokio::spawn(async move {
            while let Some(err) = errors.recv().await {
                log::error!("Event monitor failed: {}", err);
            }
        });
    }

    let tracker = Arc::new(Mutex::new(tracker));
    let server = api::APIServer::new(Arc::clone(&tracker));
    tokio::select! {
        result = server.listen(addr) => result?,
        result = shutdown_signal() => result?,
    }

    log::info!("Stopping tracker");
    tracker
        .lock()
        .await
        .stop()
        .await
        .ok_log_at(log::Level::Debug);
    Ok(())
}

async fn next_error(errors: &mut Option<mpsc::Receiver<monitor::Error>>) -> Option<monitor::Error> {
    match errors {
        Some(errors) => errors.recv().await,
        None => std::future::pending().await,
    }
}

/// Resolves once SIGINT or SIGTERM is received.
async fn shutdown_signal() -> error::Result<()> {
    let mut terminate = signal(SignalKind::terminate()).map_err(Error::Signal)?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map_err(Error::Signal),
        _ = terminate.recv() => Ok(()),
    }
}
