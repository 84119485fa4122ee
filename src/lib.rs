//! Meme generator backend: accepts an image upload, describes it with a
//! captioning model, asks a text-generation model for five funny
//! captions, and renders each one onto a copy of the image.

pub mod api;
pub mod captions;
pub mod compositor;
pub mod config;
pub mod inference;

use std::sync::Arc;

use compositor::Compositor;
use config::AppConfig;
use inference::InferenceClient;

/// Everything a request handler needs, built once at startup.
pub struct AppState {
    pub config: AppConfig,
    pub client: InferenceClient,
    pub compositor: Compositor,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let client = InferenceClient::new(&config);
        let compositor = Compositor::new(config.font_path.as_deref());
        Self {
            config,
            client,
            compositor,
        }
    }
}
