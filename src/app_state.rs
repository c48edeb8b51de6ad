use crate::codec::{Codec, WebpCodec};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

/// Shared by every request. Holds no per-request data.
#[derive(Clone)]
pub struct AppState {
    pub codec: Arc<dyn Codec>,
    /// Bounds how many images are encoded at once
    pub encoder_permits: Arc<Semaphore>,
}

impl AppState {
    pub fn new(codec: Arc<dyn Codec>, permits: usize) -> Self {
        info!(permits, "Encoder pool ready");
        Self {
            codec,
            encoder_permits: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn with_webp(permits: usize) -> Self {
        Self::new(Arc::new(WebpCodec::default()), permits)
    }
}
