use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::error::Error;
use crate::runtime::RuntimeClient;
use crate::tracker::Tracker;

mod models;

pub use models::{StatusMessage, TrackedContainers};

/// Tracker shared between the HTTP handlers and the process that owns it.
pub type SharedTracker<C> = Arc<Mutex<Tracker<C>>>;

async fn start_tracker<C: RuntimeClient>(State(tracker): State<SharedTracker<C>>) -> Response {
    match tracker.lock().await.start() {
        Ok(()) => (StatusCode::OK, Json(StatusMessage::new("started ok"))).into_response(),
        Err(err) => {
            log::error!("Failed to start tracker: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusMessage::new(err.to_string())),
            )
                .into_response()
        }
    }
}

async fn stop_tracker<C: RuntimeClient>(State(tracker): State<SharedTracker<C>>) -> Response {
    match tracker.lock().await.stop().await {
        Ok(()) => (StatusCode::OK, Json(StatusMessage::new("ok"))).into_response(),
        Err(err) => {
            log::error!("Failed to stop tracker: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusMessage::new(err.to_string())),
            )
                .into_response()
        }
    }
}

async fn list_containers<C: RuntimeClient>(State(tracker): State<SharedTracker<C>>) -> Response {
    let tracker = tracker.lock().await;
    let body = TrackedContainers {
        state: tracker.state(),
        dropped_events: tracker.dropped_events(),
        containers: tracker.snapshot(),
    };

    (StatusCode::OK, Json(body)).into_response()
}

pub struct APIServer {
    router: axum::Router,
}

impl APIServer {
    pub fn new<C: RuntimeClient>(tracker: SharedTracker<C>) -> Self {
        let router = axum::Router::new()
            .route("/containerd/start", get(start_tracker::<C>))
            .route("/containerd/stop", get(stop_tracker::<C>))
            .route("/containerd/containers", get(list_containers::<C>))
            .layer(CorsLayer::permissive())
            .with_state(tracker);
        Self { router }
    }

    /// Serves the API until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serve`] if `addr` cannot be bound or serving fails.
    pub async fn listen(self, addr: &str) -> crate::error::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Serve {
                addr: addr.to_owned(),
                source,
            })?;
        log::info!("Serving tracker API on {}", addr);
        axum::serve(listener, self.router.into_make_service())
            .await
            .map_err(|source| Error::Serve {
                addr: addr.to_owned(),
                source,
            })
    }
}
