//! HTTP relay server
//!
//! Two stateless POST endpoints:
//! - `/api/generate` streams model output as `data:` frames
//! - `/api/proxy-video` fetches a remote video and returns it as base64
//!
//! Any other method on those paths gets a 405 with a JSON error body.

pub mod media;
pub mod relay;

use std::{future::Future, sync::Arc};

use axum::{response::Response, routing::post, Router};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub use media::MediaFetcher;

use crate::{
    config::ServerConfig,
    error::{Result, VidChatError},
    services::{GeminiAdapter, GenerationBackend},
};

/// Shared, immutable state handed to every handler
#[derive(Clone)]
pub struct AppState {
    /// Generation backend; `None` when the server has no credential
    backend: Option<Arc<dyn GenerationBackend>>,

    /// Remote video fetcher
    media: Arc<MediaFetcher>,
}

impl AppState {
    /// Create state from explicit collaborators
    pub fn new(backend: Option<Arc<dyn GenerationBackend>>, media: MediaFetcher) -> Self {
        Self {
            backend,
            media: Arc::new(media),
        }
    }

    /// Build state from server settings
    ///
    /// A missing API key leaves the backend unset, so `/api/generate`
    /// answers with a configuration error instead of failing at startup.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be built
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let backend: Option<Arc<dyn GenerationBackend>> = match GeminiAdapter::from_config(config) {
            Ok(adapter) => Some(Arc::new(adapter)),
            Err(VidChatError::Configuration(reason)) => {
                warn!(%reason, "Generation backend disabled");
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Self::new(backend, MediaFetcher::from_config(config)?))
    }

    pub(crate) fn backend(&self) -> Result<&Arc<dyn GenerationBackend>> {
        self.backend.as_ref().ok_or_else(|| {
            VidChatError::Configuration("API key is not configured on the server".to_string())
        })
    }

    pub(crate) fn media(&self) -> &MediaFetcher {
        &self.media
    }
}

/// Build the relay router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/generate",
            post(relay::generate).fallback(method_not_allowed),
        )
        .route(
            "/api/proxy-video",
            post(media::proxy_video).fallback(method_not_allowed),
        )
        .with_state(state)
}

async fn method_not_allowed() -> Response {
    use axum::response::IntoResponse;
    VidChatError::MethodNotAllowed.into_response()
}

/// Validate settings, bind, and serve until Ctrl+C
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the listener fails
pub async fn serve(config: ServerConfig) -> Result<()> {
    config.validate()?;

    let state = AppState::from_config(&config)?;
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, model = %config.model, "Relay server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(tokio::signal::ctrl_c()))
        .await?;

    Ok(())
}

/// Resolve once the signal fires
///
/// If the handler cannot be installed the server keeps running instead of
/// shutting down straight away.
async fn shutdown_signal<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Shutting down relay server"),
        Err(e) => {
            error!(error = %e, "Failed to install Ctrl+C handler, graceful shutdown disabled");
            std::future::pending::<()>().await;
        }
    }
}
