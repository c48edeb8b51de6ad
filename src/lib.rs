pub mod api;
pub mod app_state;
pub mod codec;
pub mod config;
pub mod convert;
pub mod error;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Extension};
use axum::routing::post;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

//
// Re-export
//
pub use api::{CONVERT_ROUTE, ConvertResponse, convert_to_webp, log_request_errors};
pub use app_state::AppState;
pub use codec::{Codec, CodecError, EncodeSettings, WebpCodec};
pub use config::Config;
pub use convert::{ConversionRequest, ConversionResult, Quality};
pub use error::{ConvertError, ErrorResponse};

/// Build the HTTP router around a prepared state.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    // The page that talks to this API may be served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(CONVERT_ROUTE, post(convert_to_webp))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(axum::middleware::from_fn(api::log_request_errors))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(state))
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let state = AppState::with_webp(config.permits);
    let app = router(state, config.max_upload_bytes);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(
        %addr,
        max_upload_bytes = config.max_upload_bytes,
        "Listening, POST {CONVERT_ROUTE}"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(?error, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
