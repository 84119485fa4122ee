use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, resolved once at startup from the process
/// environment (`.env` files are loaded by the caller via dotenvy).
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the model-hosting API; model ids are appended to it.
    pub api_base: String,
    /// Bearer token for the inference API. Optional at startup: absence
    /// only fails the individual inference call that needs it.
    pub api_token: Option<String>,
    /// Image-to-text model used to describe the uploaded picture.
    pub caption_model: String,
    /// Text-generation model used to write the meme captions.
    pub generation_model: String,
    /// Directory originals and rendered memes are written to, served
    /// back under `/static`.
    pub upload_dir: PathBuf,
    /// Optional TrueType font override for the compositor.
    pub font_path: Option<PathBuf>,
    /// Per-attempt timeout for inference requests.
    pub request_timeout: Duration,
    /// Total attempts per inference call, first try included.
    pub max_attempts: u32,
    /// Backoff unit: sleep `retry_base * attempt` between attempts.
    pub retry_base: Duration,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            api_base: env::var("HF_API_BASE")
                .unwrap_or_else(|_| "https://api-inference.huggingface.co/models".to_string()),
            api_token: env::var("HF_TOKEN").ok().filter(|token| !token.is_empty()),
            caption_model: env::var("CAPTION_MODEL")
                .unwrap_or_else(|_| "Salesforce/blip-image-captioning-base".to_string()),
            generation_model: env::var("GENERATION_MODEL")
                .unwrap_or_else(|_| "meta-llama/Llama-3.1-8B-Instruct".to_string()),
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("static")),
            font_path: env::var("MEME_FONT").ok().map(PathBuf::from),
            request_timeout: Duration::from_secs(60),
            max_attempts: 3,
            retry_base: Duration::from_secs(2),
            port: env::var("PORT")
                .ok()
                .and_then(|value| value.parse::<u16>().ok())
                .unwrap_or(3000),
        }
    }
}
