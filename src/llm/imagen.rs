use std::future::Future;

use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::media::ImageArtifact;
use crate::persona::{AspectRatio, PersonaAttributes};
use crate::prompts::{
    compose_inpaint_prompt, compose_persona_prompt, compose_scene_prompt,
    compose_text_overlay_prompt,
};
use crate::utils::timing::log_image_timing;

const OUTPUT_MIME_TYPE: &str = "image/jpeg";
const MASK_MIME_TYPE: &str = "image/png";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Image generation failed: {0}")]
pub struct ImageGenerationError(pub String);

/// The four remote operations the studio sequences.
pub trait ImageService: Send + Sync {
    fn generate(
        &self,
        attributes: &PersonaAttributes,
    ) -> impl Future<Output = Result<ImageArtifact, ImageGenerationError>> + Send;

    fn inpaint(
        &self,
        prompt: &str,
        image: &ImageArtifact,
        mask_png: &[u8],
    ) -> impl Future<Output = Result<ImageArtifact, ImageGenerationError>> + Send;

    fn regenerate_scene(
        &self,
        prompt: &str,
        image: &ImageArtifact,
        aspect_ratio: AspectRatio,
    ) -> impl Future<Output = Result<ImageArtifact, ImageGenerationError>> + Send;

    fn add_text(
        &self,
        text: &str,
        language: &str,
        image: &ImageArtifact,
    ) -> impl Future<Output = Result<ImageArtifact, ImageGenerationError>> + Send;
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    predictions: Option<Vec<Prediction>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
    rai_filtered_reason: Option<String>,
}

fn inline_image(bytes: &[u8], mime_type: &str) -> Value {
    json!({
        "bytesBase64Encoded": general_purpose::STANDARD.encode(bytes),
        "mimeType": mime_type,
    })
}

pub(crate) fn build_predict_payload(
    prompt: &str,
    reference: Option<&ImageArtifact>,
    mask_png: Option<&[u8]>,
    aspect_ratio: Option<AspectRatio>,
) -> Value {
    let mut instance = Map::new();
    instance.insert("prompt".to_string(), json!(prompt));
    if let Some(reference) = reference {
        instance.insert(
            "image".to_string(),
            inline_image(&reference.bytes, &reference.mime_type),
        );
    }
    if let Some(mask_png) = mask_png {
        instance.insert(
            "mask".to_string(),
            json!({ "image": inline_image(mask_png, MASK_MIME_TYPE) }),
        );
    }

    let mut parameters = Map::new();
    parameters.insert("sampleCount".to_string(), json!(1));
    parameters.insert(
        "outputOptions".to_string(),
        json!({ "mimeType": OUTPUT_MIME_TYPE }),
    );
    if let Some(aspect_ratio) = aspect_ratio {
        parameters.insert("aspectRatio".to_string(), json!(aspect_ratio.as_str()));
    }

    json!({
        "instances": [Value::Object(instance)],
        "parameters": Value::Object(parameters),
    })
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_inline(value: Option<&Value>) -> Option<Value> {
    let value = value?;
    let data_len = value
        .get("bytesBase64Encoded")
        .and_then(|data| data.as_str())
        .map(|data| data.len())
        .unwrap_or(0);
    let mime_type = value
        .get("mimeType")
        .and_then(|mime| mime.as_str())
        .unwrap_or("unknown");
    Some(json!({ "mimeType": mime_type, "dataLen": data_len }))
}

/// Debug-friendly view of a payload with image bodies replaced by sizes.
fn summarize_payload(payload: &Value) -> Value {
    let instance = payload.pointer("/instances/0");
    let prompt = instance
        .and_then(|value| value.get("prompt"))
        .and_then(|value| value.as_str())
        .map(|value| truncate_for_log(value, 200));
    json!({
        "prompt": prompt,
        "image": summarize_inline(instance.and_then(|value| value.get("image"))),
        "mask": summarize_inline(instance.and_then(|value| value.pointer("/mask/image"))),
        "parameters": payload.get("parameters"),
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

/// First prediction that carries decodable image bytes.
pub(crate) fn extract_first_image(
    body: &str,
    model: &str,
) -> Result<ImageArtifact, ImageGenerationError> {
    let response: PredictResponse = serde_json::from_str(body).map_err(|err| {
        ImageGenerationError(format!("Unreadable response from {model}: {err}"))
    })?;

    let predictions = response.predictions.unwrap_or_default();
    let mut filtered_reason = None;
    for prediction in predictions {
        let Some(data) = prediction.bytes_base64_encoded.as_deref() else {
            if filtered_reason.is_none() {
                filtered_reason = prediction.rai_filtered_reason.clone();
            }
            continue;
        };
        match general_purpose::STANDARD.decode(data.trim()) {
            Ok(bytes) if !bytes.is_empty() => {
                return Ok(ImageArtifact::new(bytes, prediction.mime_type.as_deref()));
            }
            Ok(_) => continue,
            Err(err) => warn!("Skipping undecodable prediction from {}: {}", model, err),
        }
    }

    let detail = match filtered_reason {
        Some(reason) => format!("No images returned by {model} (filtered: {reason})"),
        None => format!("No images returned by {model}"),
    };
    Err(ImageGenerationError(detail))
}

pub struct ImagenClient {
    http: Client,
    api_key: String,
    model: String,
    predict_url: String,
}

impl ImagenClient {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            api_key: config.gemini_api_key.clone(),
            model: config.imagen_model.clone(),
            predict_url: config.predict_url(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn redact(&self, text: &str) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    async fn predict(&self, payload: Value) -> Result<ImageArtifact, ImageGenerationError> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            let summary = summarize_payload(&payload);
            debug!(target: "llm.imagen", model = %self.model, payload = %summary);
        }

        let response = self
            .http
            .post(&self.predict_url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                let err_text = self.redact(&err.to_string());
                warn!(
                    "Imagen request failed to send: {} (timeout={}, connect={})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect()
                );
                ImageGenerationError(format!("Request to {} failed: {}", self.model, err_text))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            ImageGenerationError(format!(
                "Failed to read response from {}: {}",
                self.model,
                self.redact(&err.to_string())
            ))
        })?;

        if !status.is_success() {
            let (message, body_summary) = summarize_error_body(&body);
            warn!(
                "Imagen API error: status={}, body={}",
                status,
                self.redact(&body_summary)
            );
            let detail = self.redact(&message.unwrap_or(body_summary));
            return Err(ImageGenerationError(format!(
                "{} responded with status {}: {}",
                self.model, status, detail
            )));
        }

        let artifact = extract_first_image(&body, &self.model)?;
        debug!(
            target: "llm.imagen",
            model = %self.model,
            mime_type = %artifact.mime_type,
            bytes = artifact.bytes.len()
        );
        Ok(artifact)
    }

    async fn timed_predict(
        &self,
        operation: &str,
        metadata: Value,
        payload: Value,
    ) -> Result<ImageArtifact, ImageGenerationError> {
        log_image_timing("imagen", &self.model, operation, Some(metadata), || {
            self.predict(payload)
        })
        .await
    }
}

impl ImageService for ImagenClient {
    async fn generate(
        &self,
        attributes: &PersonaAttributes,
    ) -> Result<ImageArtifact, ImageGenerationError> {
        let prompt = compose_persona_prompt(attributes);
        let payload = build_predict_payload(&prompt, None, None, Some(attributes.aspect_ratio));
        let metadata = json!({ "aspectRatio": attributes.aspect_ratio.as_str() });
        self.timed_predict("generate", metadata, payload).await
    }

    async fn inpaint(
        &self,
        prompt: &str,
        image: &ImageArtifact,
        mask_png: &[u8],
    ) -> Result<ImageArtifact, ImageGenerationError> {
        let prompt = compose_inpaint_prompt(prompt);
        let payload = build_predict_payload(&prompt, Some(image), Some(mask_png), None);
        let metadata = json!({ "imageBytes": image.bytes.len(), "maskBytes": mask_png.len() });
        self.timed_predict("inpaint", metadata, payload).await
    }

    async fn regenerate_scene(
        &self,
        prompt: &str,
        image: &ImageArtifact,
        aspect_ratio: AspectRatio,
    ) -> Result<ImageArtifact, ImageGenerationError> {
        let prompt = compose_scene_prompt(prompt);
        let payload = build_predict_payload(&prompt, Some(image), None, Some(aspect_ratio));
        let metadata = json!({ "imageBytes": image.bytes.len(), "aspectRatio": aspect_ratio.as_str() });
        self.timed_predict("regenerate_scene", metadata, payload).await
    }

    async fn add_text(
        &self,
        text: &str,
        language: &str,
        image: &ImageArtifact,
    ) -> Result<ImageArtifact, ImageGenerationError> {
        let prompt = compose_text_overlay_prompt(text, language);
        let payload = build_predict_payload(&prompt, Some(image), None, None);
        let metadata = json!({ "imageBytes": image.bytes.len(), "language": language });
        self.timed_predict("add_text", metadata, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::llm::media::sample_jpeg;

    #[test]
    fn generate_payload_requests_one_jpeg_at_aspect_ratio() {
        let payload = build_predict_payload("hello", None, None, Some(AspectRatio::Portrait));
        assert_eq!(payload.pointer("/instances/0/prompt"), Some(&json!("hello")));
        assert!(payload.pointer("/instances/0/image").is_none());
        assert_eq!(payload.pointer("/parameters/sampleCount"), Some(&json!(1)));
        assert_eq!(
            payload.pointer("/parameters/outputOptions/mimeType"),
            Some(&json!("image/jpeg"))
        );
        assert_eq!(payload.pointer("/parameters/aspectRatio"), Some(&json!("3:4")));
    }

    #[test]
    fn inpaint_payload_carries_reference_and_mask() {
        let image = ImageArtifact::new(sample_jpeg(4, 4), None);
        let payload = build_predict_payload("fix", Some(&image), Some(b"mask"), None);
        assert_eq!(
            payload.pointer("/instances/0/image/mimeType"),
            Some(&json!("image/jpeg"))
        );
        assert_eq!(
            payload.pointer("/instances/0/mask/image/bytesBase64Encoded"),
            Some(&json!("bWFzaw=="))
        );
        assert_eq!(
            payload.pointer("/instances/0/mask/image/mimeType"),
            Some(&json!("image/png"))
        );
        assert!(payload.pointer("/parameters/aspectRatio").is_none());
    }

    #[test]
    fn reference_keeps_its_own_mime_type() {
        let mut png = Vec::new();
        image::RgbImage::from_pixel(3, 3, image::Rgb([10, 20, 30]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let image = ImageArtifact::new(png, Some("image/jpeg"));
        assert_eq!(image.mime_type, "image/png");

        let payload = build_predict_payload("sign", Some(&image), None, None);
        assert_eq!(
            payload.pointer("/instances/0/image/mimeType"),
            Some(&json!("image/png"))
        );
    }

    #[test]
    fn payload_summary_hides_image_bytes() {
        let image = ImageArtifact::new(sample_jpeg(4, 4), None);
        let payload = build_predict_payload("fix", Some(&image), Some(b"mask"), None);
        let summary = summarize_payload(&payload).to_string();
        assert!(!summary.contains(&image.base64()));
        assert!(summary.contains("dataLen"));
    }

    #[test]
    fn takes_first_image_from_predictions() {
        let first = general_purpose::STANDARD.encode(sample_jpeg(3, 2));
        let second = general_purpose::STANDARD.encode(sample_jpeg(5, 5));
        let body = json!({
            "predictions": [
                { "raiFilteredReason": "blocked" },
                { "bytesBase64Encoded": first, "mimeType": "image/jpeg" },
                { "bytesBase64Encoded": second, "mimeType": "image/jpeg" }
            ]
        })
        .to_string();
        let artifact = extract_first_image(&body, "imagen").unwrap();
        assert_eq!(artifact.dimensions(), Some((3, 2)));
    }

    #[test]
    fn zero_images_is_an_error() {
        let err = extract_first_image(r#"{"predictions": []}"#, "imagen").unwrap_err();
        assert_eq!(err.0, "No images returned by imagen");
        let err = extract_first_image("{}", "imagen").unwrap_err();
        assert!(err.0.starts_with("No images returned"));
        let err = extract_first_image(
            r#"{"predictions": [{"raiFilteredReason": "people"}]}"#,
            "imagen",
        )
        .unwrap_err();
        assert!(err.0.contains("filtered: people"));
    }

    #[test]
    fn unreadable_body_is_an_error() {
        let err = extract_first_image("<html>", "imagen").unwrap_err();
        assert!(err.0.starts_with("Unreadable response from imagen"));
    }

    #[test]
    fn extracts_provider_error_message() {
        let (message, _) =
            summarize_error_body(r#"{"error": {"code": 400, "message": "Bad prompt"}}"#);
        assert_eq!(message.as_deref(), Some("Bad prompt"));
        let (message, summary) = summarize_error_body("   ");
        assert!(message.is_none());
        assert_eq!(summary, "empty response body");
    }

    #[test]
    fn redacts_api_key() {
        let client = ImagenClient::new(Client::new(), &test_config());
        assert_eq!(
            client.redact("url?key=test-key failed"),
            "url?key=[redacted] failed"
        );
        assert_eq!(client.model(), "imagen-4.0-generate-001");
    }
}
