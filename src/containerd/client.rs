use std::path::Path;
use std::str::FromStr;

use tokio::sync::Mutex;
use tonic::codec::Streaming;
use tonic::metadata::{AsciiMetadataValue, MetadataValue};
use tonic::transport::Channel;

use super::api::services::containers::v1::containers_client::ContainersClient;
use super::api::services::containers::v1::{
    GetContainerRequest, GetContainerResponse, ListContainersRequest,
};
use super::api::services::events::v1::events_client::EventsClient;
use super::api::services::events::v1::{Envelope, SubscribeRequest};
use super::api::services::namespaces::v1::ListNamespacesRequest;
use super::api::services::namespaces::v1::namespaces_client::NamespacesClient;
use super::api::services::tasks::v1::ListPidsRequest;
use super::api::services::tasks::v1::tasks_client::TasksClient;
use super::api::services::version::v1::VersionResponse;
use super::api::services::version::v1::version_client::VersionClient;
use super::events::decode_envelope;
use crate::runtime::{
    ContainerDescriptor, Error, EventSubscription, Labels, Result, RuntimeClient, RuntimeEvent,
};

/// Header selecting the containerd namespace a request operates in.
const NAMESPACE_HEADER: &str = "containerd-namespace";

/// Client for the containerd gRPC API, scoped to one containerd namespace.
///
/// The channel is released by [`close`](RuntimeClient::close); calls made afterwards
/// fail with [`Error::Closed`].
#[derive(Debug)]
pub struct ContainerdClient {
    channel: Mutex<Option<Channel>>,
    namespace: String,
    namespace_header: AsciiMetadataValue,
}

impl ContainerdClient {
    /// Connects to the containerd socket and checks the daemon is responsive.
    ///
    /// # Errors
    ///
    /// - [`Error::Connect`] if the socket cannot be reached.
    /// - [`Error::InvalidNamespace`] if `namespace` is not a valid header value.
    /// - [`Error::Rpc`] if the version handshake fails.
    pub async fn connect(socket_path: impl AsRef<Path>, namespace: &str) -> Result<Self> {
        let socket_path = socket_path.as_ref();
        let channel = crate::grpc::channel_for_unix_socket(socket_path)
            .await
            .map_err(|source| Error::Connect {
                path: socket_path.to_path_buf(),
                source,
            })?;
        let client = Self::with_channel(channel, namespace)?;

        let version = client.version().await?;
        log::info!(
            "containerd version (daemon: {} [Revision: {}])",
            version.version,
            version.revision
        );

        Ok(client)
    }

    /// Wraps an already established channel.
    pub fn with_channel(channel: Channel, namespace: &str) -> Result<Self> {
        let namespace_header =
            MetadataValue::from_str(namespace).map_err(|_| Error::InvalidNamespace {
                namespace: namespace.to_owned(),
            })?;

        Ok(Self {
            channel: Mutex::new(Some(channel)),
            namespace: namespace.to_owned(),
            namespace_header,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn version(&self) -> Result<VersionResponse> {
        let mut client = VersionClient::new(self.channel().await?);
        let response = client
            .version(())
            .await
            .map_err(|err| Error::from_status("version", "", err))?;

        Ok(response.into_inner())
    }

    /// Lists all containerd namespaces.
    pub async fn list_namespaces(&self) -> Result<Vec<String>> {
        let mut client = NamespacesClient::new(self.channel().await?);
        let response = client
            .list(ListNamespacesRequest {
                filter: String::new(),
            })
            .await
            .map_err(|err| Error::from_status("list namespaces", "", err))?;

        Ok(response
            .into_inner()
            .namespaces
            .into_iter()
            .map(|namespace| namespace.name)
            .collect())
    }

    /// Clones the channel out, failing once the client was closed.
    async fn channel(&self) -> Result<Channel> {
        self.channel.lock().await.clone().ok_or(Error::Closed)
    }

    fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request
            .metadata_mut()
            .insert(NAMESPACE_HEADER, self.namespace_header.clone());
        request
    }
}

/// Connects to the containerd socket and lists its namespaces.
///
/// # Errors
///
/// Returns [`Error::Connect`] if the socket cannot be reached and [`Error::Rpc`] if the
/// call fails.
pub async fn list_namespaces(socket_path: impl AsRef<Path>) -> Result<Vec<String>> {
    let socket_path = socket_path.as_ref();
    let channel = crate::grpc::channel_for_unix_socket(socket_path)
        .await
        .map_err(|source| Error::Connect {
            path: socket_path.to_path_buf(),
            source,
        })?;
    let client = ContainerdClient::with_channel(channel, "default")?;
    let namespaces = client.list_namespaces().await;
    client.close().await;
    namespaces
}

/// Extracts the labels from a container lookup; a response without a container counts as
/// not found.
fn container_labels(id: &str, response: GetContainerResponse) -> Result<Labels> {
    response
        .container
        .map(|container| container.labels)
        .ok_or_else(|| Error::NotFound { id: id.to_owned() })
}

impl RuntimeClient for ContainerdClient {
    type Subscription = ContainerdSubscription;

    async fn list_containers(&self) -> Result<Vec<ContainerDescriptor>> {
        let mut client = ContainersClient::new(self.channel().await?);
        let response = client
            .list(self.request(ListContainersRequest {
                filters: Vec::default(),
            }))
            .await
            .map_err(|err| Error::from_status("list containers", "", err))?;

        let containers = response.into_inner().containers;
        log::debug!(
            "Found {} containers in namespace `{}`",
            containers.len(),
            self.namespace
        );
        Ok(containers
            .into_iter()
            .map(|container| ContainerDescriptor {
                id: container.id,
                labels: container.labels,
            })
            .collect())
    }

    async fn get_container(&self, id: &str) -> Result<Labels> {
        let mut client = ContainersClient::new(self.channel().await?);
        let response = client
            .get(self.request(GetContainerRequest { id: id.to_owned() }))
            .await
            .map_err(|err| Error::from_status("get container", id, err))?;

        container_labels(id, response.into_inner())
    }

    async fn list_pids(&self, container_id: &str) -> Result<Vec<u32>> {
        let mut client = TasksClient::new(self.channel().await?);
        let response = client
            .list_pids(self.request(ListPidsRequest {
                container_id: container_id.to_owned(),
            }))
            .await
            .map_err(|err| Error::from_status("list pids", container_id, err))?;

        Ok(response
            .into_inner()
            .processes
            .into_iter()
            .map(|process| process.pid)
            .collect())
    }

    async fn subscribe(&self, filters: Vec<String>) -> Result<ContainerdSubscription> {
        let mut client = EventsClient::new(self.channel().await?);
        let response = client
            .subscribe(self.request(SubscribeRequest { filters }))
            .await
            .map_err(|err| Error::Subscribe(Box::new(err)))?;

        Ok(ContainerdSubscription {
            stream: response.into_inner(),
        })
    }

    async fn close(&self) {
        // the connection ends once the last clone of the channel is dropped
        if let Some(channel) = self.channel.lock().await.take() {
            drop(channel);
            log::info!("Closed connection to containerd");
        }
    }
}

/// Event feed of the containerd events service.
pub struct ContainerdSubscription {
    stream: Streaming<Envelope>,
}

impl EventSubscription for ContainerdSubscription {
    async fn next_event(&mut self) -> Result<Option<RuntimeEvent>> {
        loop {
            let Some(envelope) = self
                .stream
                .message()
                .await
                .map_err(|err| Error::EventMessage(Box::new(err)))?
            else {
                return Ok(None);
            };
            log::debug!(
                "Received event: topic={}, namespace={}, timestamp={:?}",
                envelope.topic,
                envelope.namespace,
                envelope.timestamp,
            );

            match decode_envelope(envelope) {
                Ok(event) => return Ok(Some(event)),
                Err(err) => log::error!("{}", err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    use super::*;
    use crate::containerd::api::services::containers::v1::Container;

    #[test]
    fn test_container_labels() {
        let response = GetContainerResponse {
            container: Some(Container {
                id: "c1".into(),
                labels: Labels::from([("app".to_owned(), "web".to_owned())]),
                ..Default::default()
            }),
        };
        let labels = container_labels("c1", response).unwrap();
        assert_eq!(labels.get("app").map(String::as_str), Some("web"));
    }

    #[test]
    fn test_missing_container_is_not_found() {
        let err = container_labels("c1", GetContainerResponse { container: None }).unwrap_err();
        assert!(matches!(err, Error::NotFound { id } if id == "c1"));
    }

    #[tokio::test]
    async fn test_invalid_namespace_header() {
        let channel = Channel::from_static("http://[::]:50051").connect_lazy();
        let err = ContainerdClient::with_channel(channel, "k8s\nio").unwrap_err();
        assert!(matches!(err, Error::InvalidNamespace { .. }));
    }

    #[tokio::test]
    async fn test_close_releases_connection() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("containerd.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.map(|(stream, _)| stream) });

        let channel = crate::grpc::channel_for_unix_socket(&socket).await.unwrap();
        let client = ContainerdClient::with_channel(channel, "k8s.io").unwrap();
        let mut stream = accept.await.unwrap().unwrap();

        client.close().await;

        // drain the connection preface until the client hangs up
        let mut buf = [0u8; 1024];
        let eof = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
        assert!(eof.is_ok(), "connection stayed open after close");

        assert!(matches!(
            client.list_containers().await,
            Err(Error::Closed)
        ));
        client.close().await;
    }
}
