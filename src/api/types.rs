use serde::Serialize;

/// Successful meme generation: file references plus the text that went
/// into them.
#[derive(Debug, Serialize)]
pub struct MemeResponse {
    pub success: bool,
    pub memes: Vec<String>,
    pub captions: Vec<String>,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub hf_token_set: bool,
}
