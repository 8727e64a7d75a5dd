use std::path::Path;

use hyper_util::rt::TokioIo;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

/// Placeholder authority; requests are routed over the unix socket regardless.
const UNIX_SOCKET_AUTHORITY: &str = "http://[::]:50051";

/// Creates a tonic [`Channel`] talking HTTP/2 over the unix socket at `path`.
///
/// The socket is dialed eagerly, so an unreachable daemon is reported here rather than on
/// the first call.
pub async fn channel_for_unix_socket(
    path: impl AsRef<Path>,
) -> Result<Channel, tonic::transport::Error> {
    let path = path.as_ref().to_path_buf();
    log::debug!("Connecting to {}...", path.display());

    let connector = {
        let path = path.clone();
        service_fn(move |_: Uri| {
            let path = path.clone();
            async move {
                let stream = tokio::net::UnixStream::connect(path).await?;
                Ok::<_, std::io::Error>(TokioIo::new(stream))
            }
        })
    };
    let channel = Endpoint::from_static(UNIX_SOCKET_AUTHORITY)
        .connect_with_connector(connector)
        .await?;
    log::debug!("Created channel for {}.", path.display());

    Ok(channel)
}
