use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Local;
use tracing::{error, info};
use uuid::Uuid;

use crate::captions;
use crate::compositor::RenderedMeme;
use crate::SharedState;

use super::types::{ErrorResponse, HealthResponse, MemeResponse};

const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

type ApiError = (StatusCode, Json<ErrorResponse>);

pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        message: "Meme generator API is running!",
        hf_token_set: state.config.api_token.is_some(),
    })
}

pub async fn ping() -> &'static str {
    "pong"
}

/// The whole pipeline: validate the upload, persist it, describe it,
/// synthesize captions, render one meme per caption.
pub async fn generate_memes(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<MemeResponse>, ApiError> {
    info!("received meme generation request");

    let upload = read_image_field(&mut multipart).await?;
    if !allowed_file(&upload.filename) {
        return Err(bad_request("Invalid file type"));
    }

    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let unique_id = short_id();
    let original_name = format!("original_{timestamp}_{unique_id}.jpg");
    let original_path = state.config.upload_dir.join(&original_name);
    tokio::fs::write(&original_path, &upload.bytes)
        .await
        .map_err(|err| {
            error!(error = %err, path = %original_path.display(), "could not persist upload");
            internal_error(format!("could not save upload: {err}"))
        })?;
    info!(path = %original_path.display(), "saved original image");

    let description = captions::describe_image(
        &state.client,
        &state.config.caption_model,
        upload.bytes.to_vec(),
    )
    .await;
    info!(%description, "image described");

    let set =
        captions::synthesize(&state.client, &state.config.generation_model, &description).await;
    info!(origin = ?set.origin, captions = ?set.captions, "captions ready");

    let mut memes = Vec::with_capacity(set.captions.len());
    for (index, caption) in set.captions.iter().enumerate() {
        let meme_name = format!("meme_{timestamp}_{unique_id}_{}.jpg", index + 1);
        let meme_path = state.config.upload_dir.join(&meme_name);
        match state.compositor.compose(&original_path, caption, &meme_path) {
            Ok(RenderedMeme::Captioned) => {}
            Ok(RenderedMeme::Plain) => {
                info!(file = %meme_name, "rendered without caption overlay");
            }
            Err(err) => {
                error!(error = %err, file = %meme_name, "could not render meme");
                return Err(internal_error(format!("could not render meme: {err}")));
            }
        }
        memes.push(format!("/static/{meme_name}"));
    }

    Ok(Json(MemeResponse {
        success: true,
        memes,
        captions: set.captions,
        description,
    }))
}

struct Upload {
    filename: String,
    bytes: Bytes,
}

/// Pulls the `image` part out of the multipart body. A missing part is
/// "No image provided", a part with an empty filename "No image selected".
async fn read_image_field(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| bad_request(format!("could not read upload: {err}")))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(bad_request("No image selected"));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|err| bad_request(format!("could not read upload: {err}")))?;
        return Ok(Upload { filename, bytes });
    }
    Err(bad_request("No image provided"))
}

fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn internal_error(message: String) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: message }),
    )
}
