//! Turns an image description into exactly five meme captions, and the
//! uploaded image into a one-line description.
//!
//! Both paths are best-effort: a failed model call degrades to canned
//! content instead of failing the request.

use serde_json::Value;
use tracing::warn;

use crate::inference::{InferenceClient, InferenceError, InferenceRequest, ModelReply};

pub const CAPTION_COUNT: usize = 5;
const MIN_CAPTION_CHARS: usize = 2;
const MAX_CAPTION_CHARS: usize = 90;

/// Appended when the model produced fewer usable lines than needed.
pub const PADDING_CAPTION: &str = "AI couldn't think of anything funnier than this";

/// Description used when the captioning model is unavailable.
pub const GENERIC_DESCRIPTION: &str = "An image";

/// Served whenever the generation call itself fails.
pub const STOCK_CAPTIONS: [&str; CAPTION_COUNT] = [
    "When AI tries to be funny",
    "This is what happens",
    "Plot twist: It's actually good",
    "Nobody expects the AI caption",
    "This meme writes itself",
];

/// Where a caption set came from, so callers can log degradation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionOrigin {
    /// Parsed out of a model response, padded if it ran short.
    Generated,
    /// The generation call failed and the stock set was served.
    Stock,
}

#[derive(Debug, Clone)]
pub struct CaptionSet {
    pub captions: Vec<String>,
    pub origin: CaptionOrigin,
}

impl CaptionSet {
    fn stock() -> Self {
        CaptionSet {
            captions: STOCK_CAPTIONS.iter().map(|s| s.to_string()).collect(),
            origin: CaptionOrigin::Stock,
        }
    }
}

/// Generates five captions for `description`. Never fails: if the model
/// call errors out after retries, the stock set is returned instead.
pub async fn synthesize(client: &InferenceClient, model: &str, description: &str) -> CaptionSet {
    let request = InferenceRequest::text_generation(model, build_prompt(description));
    match client.call(&request).await {
        Ok(value) => CaptionSet {
            captions: captions_from_text(&response_text(&value)),
            origin: CaptionOrigin::Generated,
        },
        Err(err) => {
            warn!(error = %err, "caption generation failed, serving stock captions");
            CaptionSet::stock()
        }
    }
}

/// Best-effort one-liner describing the image. Model failures and unknown
/// response shapes both fall back to [`GENERIC_DESCRIPTION`].
pub async fn describe_image(client: &InferenceClient, model: &str, image: Vec<u8>) -> String {
    let request = InferenceRequest::image_to_text(model, image);
    match client.call(&request).await {
        Ok(value) => ModelReply::first_generated_text(&value)
            .unwrap_or_else(|| GENERIC_DESCRIPTION.to_string()),
        Err(err) => {
            if matches!(err, InferenceError::MissingToken) {
                warn!("HF_TOKEN not set, describing the upload generically");
            } else {
                warn!(error = %err, "image captioning failed, using generic description");
            }
            GENERIC_DESCRIPTION.to_string()
        }
    }
}

fn build_prompt(description: &str) -> String {
    format!(
        "You are a meme writer.\n\
         Based on this image description: \"{description}\"\n\
         Generate exactly 5 short, meme-worthy captions.\n\
         Rules:\n\
         - Keep each under 60 characters\n\
         - Vary styles: sarcastic, absurd, relatable, dramatic, punny\n\
         - No numbering, return one caption per line only\n"
    )
}

/// Text considered for caption parsing. Known reply shapes contribute
/// their first `generated_text`; anything else is stringified wholesale.
fn response_text(value: &Value) -> String {
    ModelReply::first_generated_text(value).unwrap_or_else(|| value.to_string())
}

fn captions_from_text(text: &str) -> Vec<String> {
    let mut captions = parse_caption_lines(text);
    if captions.len() < CAPTION_COUNT {
        warn!(usable = captions.len(), "model yielded too few usable caption lines, padding");
    }
    while captions.len() < CAPTION_COUNT {
        captions.push(PADDING_CAPTION.to_string());
    }
    captions
}

/// Accepts up to five lines, shaving off list markers the model added
/// despite instructions and dropping lines outside the length bounds.
fn parse_caption_lines(text: &str) -> Vec<String> {
    let mut captions = Vec::with_capacity(CAPTION_COUNT);
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line = line.trim_start_matches(is_list_marker);
        let chars = line.chars().count();
        if (MIN_CAPTION_CHARS..=MAX_CAPTION_CHARS).contains(&chars) {
            captions.push(line.to_string());
        }
        if captions.len() == CAPTION_COUNT {
            break;
        }
    }
    captions
}

fn is_list_marker(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '-' | '•' | '*' | '.' | ' ' | ')' | '(')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::time::Duration;

    fn config_for(api_base: String, token: Option<&str>) -> AppConfig {
        AppConfig {
            api_base,
            api_token: token.map(str::to_string),
            caption_model: "org/captioner".to_string(),
            generation_model: "org/generator".to_string(),
            upload_dir: std::env::temp_dir(),
            font_path: None,
            request_timeout: Duration::from_secs(5),
            max_attempts: 3,
            retry_base: Duration::from_millis(10),
            port: 0,
        }
    }

    async fn spawn_fixed(payload: Value) -> String {
        let app = Router::new().route(
            "/models/*model",
            post(move || {
                let payload = payload.clone();
                async move { Json(payload) }
            }),
        );
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/models")
    }

    #[test]
    fn parser_strips_list_markers() {
        let text = "1. When the wifi dies\n2) Monday again\n- Send help\n• Not my job\n* Fine, I guess";
        let captions = parse_caption_lines(text);
        assert_eq!(
            captions,
            vec![
                "When the wifi dies",
                "Monday again",
                "Send help",
                "Not my job",
                "Fine, I guess",
            ]
        );
    }

    #[test]
    fn parser_drops_out_of_bounds_lines() {
        let long = "x".repeat(91);
        let text = format!("ok caption\na\n{long}\nanother fine one");
        let captions = parse_caption_lines(&text);
        assert_eq!(captions, vec!["ok caption", "another fine one"]);
    }

    #[test]
    fn parser_stops_at_five() {
        let text = "one ok\ntwo ok\nthree ok\nfour ok\nfive ok\nsix ok";
        assert_eq!(parse_caption_lines(text).len(), CAPTION_COUNT);
    }

    #[test]
    fn short_output_is_padded_with_the_fallback_line() {
        let text = "A cat typed this\n\nCtrl+Alt+Meow\n\nKeyboard warrior, literally";
        let captions = captions_from_text(text);
        assert_eq!(captions.len(), CAPTION_COUNT);
        assert_eq!(captions[0], "A cat typed this");
        assert_eq!(captions[2], "Keyboard warrior, literally");
        assert_eq!(captions[3], PADDING_CAPTION);
        assert_eq!(captions[4], PADDING_CAPTION);
    }

    #[test]
    fn prompt_embeds_the_description() {
        let prompt = build_prompt("A cat sitting on a keyboard");
        assert!(prompt.contains("\"A cat sitting on a keyboard\""));
        assert!(prompt.contains("Generate exactly 5 short, meme-worthy captions."));
    }

    #[test]
    fn unknown_reply_shapes_are_stringified() {
        let value = json!({ "error": "model overloaded" });
        assert_eq!(response_text(&value), value.to_string());
        let value = json!([{ "generated_text": "the text" }]);
        assert_eq!(response_text(&value), "the text");
    }

    #[tokio::test]
    async fn synthesize_parses_a_generated_reply() {
        let payload = json!([{
            "generated_text": "1. Cat.exe has stopped working\n2. This keyboard is mine now\n3. Paws on, humans off"
        }]);
        let base = spawn_fixed(payload).await;
        let client = InferenceClient::new(&config_for(base, Some("tkn")));

        let set = synthesize(&client, "org/generator", "A cat sitting on a keyboard").await;

        assert_eq!(set.origin, CaptionOrigin::Generated);
        assert_eq!(set.captions.len(), CAPTION_COUNT);
        assert_eq!(set.captions[0], "Cat.exe has stopped working");
        assert_eq!(set.captions[4], PADDING_CAPTION);
    }

    #[tokio::test]
    async fn synthesize_serves_stock_captions_without_a_token() {
        let client = InferenceClient::new(&config_for("http://127.0.0.1:9".to_string(), None));

        let set = synthesize(&client, "org/generator", "whatever").await;

        assert_eq!(set.origin, CaptionOrigin::Stock);
        assert_eq!(set.captions, STOCK_CAPTIONS);
    }

    #[tokio::test]
    async fn describe_image_reads_the_first_generated_text() {
        let base = spawn_fixed(json!([{ "generated_text": "a dog wearing sunglasses" }])).await;
        let client = InferenceClient::new(&config_for(base, Some("tkn")));

        let description = describe_image(&client, "org/captioner", vec![1, 2, 3]).await;

        assert_eq!(description, "a dog wearing sunglasses");
    }

    #[tokio::test]
    async fn describe_image_degrades_on_unknown_shapes() {
        let base = spawn_fixed(json!({ "error": "loading" })).await;
        let client = InferenceClient::new(&config_for(base, Some("tkn")));

        let description = describe_image(&client, "org/captioner", vec![1, 2, 3]).await;

        assert_eq!(description, GENERIC_DESCRIPTION);
    }
}
