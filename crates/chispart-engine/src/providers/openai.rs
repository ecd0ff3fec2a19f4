use anyhow::{bail, Context, Result};
use chispart_contracts::media::data_uri_from_base64;
use chispart_contracts::providers::Capability;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::adapter::GenerativeProvider;
use crate::http::{api_base_from_env, non_empty_env, response_json_or_error};

const IMAGE_SIZE: &str = "1024x1024";

pub struct OpenAiProvider {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl OpenAiProvider {
    pub fn from_env() -> Self {
        Self {
            api_base: api_base_from_env("OPENAI_API_BASE", "https://api.openai.com/v1"),
            api_key: non_empty_env("OPENAI_API_KEY"),
            http: HttpClient::new(),
        }
    }

    fn post_json(&self, path: &str, payload: &Value) -> Result<Value> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("OpenAI client not initialized: OPENAI_API_KEY not set");
        };
        let endpoint = format!("{}/{path}", self.api_base);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(payload)
            .send()
            .with_context(|| format!("OpenAI request failed ({endpoint})"))?;
        response_json_or_error("OpenAI", response)
    }

    /// Only the two DALL-E generations accept these parameters.
    fn image_model(model: &str) -> &'static str {
        if model.trim() == "dall-e-2" {
            "dall-e-2"
        } else {
            "dall-e-3"
        }
    }

    fn extract_image(response_payload: &Value) -> Option<String> {
        let first = response_payload
            .get("data")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())?;
        if let Some(b64) = first
            .get("b64_json")
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
        {
            return Some(data_uri_from_base64("image/png", b64));
        }
        first
            .get("url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn images(&self, prompt: &str, model: &str) -> Result<String> {
        let payload = json!({
            "model": Self::image_model(model),
            "prompt": prompt,
            "n": 1,
            "size": IMAGE_SIZE,
            "response_format": "b64_json",
        });
        let response_payload = self.post_json("images/generations", &payload)?;
        match Self::extract_image(&response_payload) {
            Some(image) => Ok(image),
            None => bail!("OpenAI response did not include an image"),
        }
    }
}

impl GenerativeProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn capabilities(&self) -> &[Capability] {
        &[
            Capability::ImageGeneration,
            Capability::TextGeneration,
            Capability::ImageRefinement,
        ]
    }

    fn generate_image(&self, prompt: &str, model: &str) -> Result<String> {
        self.images(prompt, model)
    }

    fn generate_text(&self, prompt: &str, model: &str, max_tokens: u32) -> Result<String> {
        let payload = json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": max_tokens,
        });
        let response_payload = self.post_json("chat/completions", &payload)?;
        Ok(response_payload
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    /// DALL-E 3 has no edit endpoint, so a refinement is a fresh generation
    /// steered by the instruction.
    fn refine_image(&self, _image_uri: &str, instruction: &str, model: &str) -> Result<String> {
        self.images(
            &format!("{instruction} (refinement of existing image)"),
            model,
        )
    }
}
