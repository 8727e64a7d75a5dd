fn main() -> std::io::Result<()> {
    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .compile_protos(
            &[
                "proto/containerd/api/services/containers/v1/containers.proto",
                "proto/containerd/api/services/events/v1/events.proto",
                "proto/containerd/api/services/tasks/v1/tasks.proto",
                "proto/containerd/api/services/namespaces/v1/namespace.proto",
                "proto/containerd/api/services/version/v1/version.proto",
                "proto/containerd/api/events/task.proto",
                "proto/containerd/api/types/task/task.proto",
            ],
            &["proto/containerd"],
        )?;

    Ok(())
}
