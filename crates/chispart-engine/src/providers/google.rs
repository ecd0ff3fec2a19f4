use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chispart_contracts::media::data_uri_from_base64;
use chispart_contracts::providers::Capability;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use super::load_source_image;
use crate::adapter::GenerativeProvider;
use crate::http::{api_base_from_env, non_empty_env, response_json_or_error};

const IMAGE_PROMPT_SUFFIX: &str = ", imagen 4";

pub struct GoogleProvider {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl GoogleProvider {
    pub fn from_env() -> Self {
        Self {
            api_base: api_base_from_env(
                "GOOGLE_AI_API_BASE",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            api_key: non_empty_env("GOOGLE_AI_API_KEY").or_else(|| non_empty_env("GEMINI_API_KEY")),
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn default_safety_settings() -> Vec<Value> {
        [
            ("HARM_CATEGORY_HATE_SPEECH", "BLOCK_ONLY_HIGH"),
            ("HARM_CATEGORY_DANGEROUS_CONTENT", "BLOCK_NONE"),
            ("HARM_CATEGORY_HARASSMENT", "BLOCK_MEDIUM_AND_ABOVE"),
            ("HARM_CATEGORY_SEXUALLY_EXPLICIT", "BLOCK_MEDIUM_AND_ABOVE"),
        ]
        .into_iter()
        .map(|(category, threshold)| {
            json!({
                "category": category,
                "threshold": threshold,
            })
        })
        .collect()
    }

    fn post(&self, model: &str, payload: &Value) -> Result<Value> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GOOGLE_AI_API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(model);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .json(payload)
            .send()
            .with_context(|| format!("Google request failed ({endpoint})"))?;
        response_json_or_error("Google", response)
    }

    fn image_payload(parts: Vec<Value>) -> Value {
        json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
            },
            "safetySettings": Self::default_safety_settings(),
        })
    }

    fn candidate_parts(response_payload: &Value) -> Vec<Value> {
        response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    fn extract_image_uri(response_payload: &Value) -> Option<String> {
        Self::candidate_parts(response_payload).iter().find_map(|part| {
            let inline = part.get("inlineData").or_else(|| part.get("inline_data"))?;
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)?;
            let data = inline.get("data").and_then(Value::as_str)?;
            if !mime_type.starts_with("image/") || data.trim().is_empty() {
                return None;
            }
            Some(data_uri_from_base64(mime_type, data))
        })
    }

    fn extract_text(response_payload: &Value) -> String {
        Self::candidate_parts(response_payload)
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<&str>>()
            .join("")
            .trim()
            .to_string()
    }
}

impl GenerativeProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn capabilities(&self) -> &[Capability] {
        &[
            Capability::ImageGeneration,
            Capability::TextGeneration,
            Capability::ImageRefinement,
        ]
    }

    fn generate_image(&self, prompt: &str, model: &str) -> Result<String> {
        let payload = Self::image_payload(vec![json!({
            "text": format!("{prompt}{IMAGE_PROMPT_SUFFIX}"),
        })]);
        let response_payload = self.post(model, &payload)?;
        match Self::extract_image_uri(&response_payload) {
            Some(uri) => Ok(uri),
            None => bail!("Google response did not include an image"),
        }
    }

    fn generate_text(&self, prompt: &str, model: &str, max_tokens: u32) -> Result<String> {
        let payload = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 0.7,
                "maxOutputTokens": max_tokens,
            },
        });
        let response_payload = self.post(model, &payload)?;
        Ok(Self::extract_text(&response_payload))
    }

    fn refine_image(&self, image_uri: &str, instruction: &str, model: &str) -> Result<String> {
        let source = load_source_image(&self.http, "Google", image_uri)?;
        let mime_type = source
            .mime_type
            .clone()
            .unwrap_or_else(|| "image/png".to_string());
        let payload = Self::image_payload(vec![
            json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": BASE64.encode(&source.bytes),
                }
            }),
            json!({ "text": format!("{instruction}{IMAGE_PROMPT_SUFFIX}") }),
        ]);
        let response_payload = self.post(model, &payload)?;
        match Self::extract_image_uri(&response_payload) {
            Some(uri) => Ok(uri),
            None => bail!("Google refinement did not produce a new image"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::GoogleProvider;

    #[test]
    fn extract_image_uri_skips_text_parts() {
        let payload = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "Here is your image"},
                        {"inlineData": {"mimeType": "image/jpeg", "data": "AAA"}}
                    ]
                }
            }]
        });
        assert_eq!(
            GoogleProvider::extract_image_uri(&payload).as_deref(),
            Some("data:image/jpeg;base64,AAA")
        );
        assert_eq!(GoogleProvider::extract_text(&payload), "Here is your image");
    }

    #[test]
    fn extract_image_uri_requires_image_mime() {
        let payload = json!({
            "candidates": [{
                "content": {"parts": [{"inline_data": {"mime_type": "text/plain", "data": "AAA"}}]}
            }]
        });
        assert!(GoogleProvider::extract_image_uri(&payload).is_none());
        assert!(GoogleProvider::extract_image_uri(&json!({})).is_none());
    }

    #[test]
    fn endpoint_accepts_prefixed_model() {
        let provider = GoogleProvider {
            api_base: "https://example.test/v1beta".to_string(),
            api_key: None,
            http: reqwest::blocking::Client::new(),
        };
        assert_eq!(
            provider.endpoint_for_model("models/gemini-2.0-flash"),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(
            provider.endpoint_for_model("gemini-2.0-flash-exp"),
            "https://example.test/v1beta/models/gemini-2.0-flash-exp:generateContent"
        );
    }
}
