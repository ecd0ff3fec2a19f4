use anyhow::{bail, Context, Result};
use chispart_contracts::media::data_uri_from_base64;
use chispart_contracts::providers::Capability;
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use super::load_source_image;
use crate::adapter::GenerativeProvider;
use crate::http::{api_base_from_env, non_empty_env, response_json_or_error};

const CFG_SCALE: u32 = 7;
const STEPS: u32 = 30;
const IMAGE_STRENGTH: &str = "0.35";
const SIDE: u32 = 1024;

pub struct StabilityProvider {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl StabilityProvider {
    pub fn from_env() -> Self {
        Self {
            api_base: api_base_from_env("STABILITY_API_BASE", "https://api.stability.ai"),
            api_key: non_empty_env("STABILITY_API_KEY"),
            http: HttpClient::new(),
        }
    }

    fn api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) => Ok(key),
            None => bail!("STABILITY_API_KEY not set"),
        }
    }

    fn endpoint(&self, model: &str, operation: &str) -> String {
        format!(
            "{}/v1/generation/{}/{operation}",
            self.api_base,
            model.trim()
        )
    }

    fn decode_artifact(response_payload: &Value) -> Option<String> {
        response_payload
            .get("artifacts")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("base64"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|b64| data_uri_from_base64("image/png", b64))
    }
}

impl GenerativeProvider for StabilityProvider {
    fn name(&self) -> &str {
        "stability"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::ImageGeneration, Capability::ImageRefinement]
    }

    fn generate_image(&self, prompt: &str, model: &str) -> Result<String> {
        let api_key = self.api_key()?;
        let endpoint = self.endpoint(model, "text-to-image");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .header("Accept", "application/json")
            .json(&json!({
                "text_prompts": [{ "text": prompt, "weight": 1 }],
                "cfg_scale": CFG_SCALE,
                "height": SIDE,
                "width": SIDE,
                "samples": 1,
                "steps": STEPS,
            }))
            .send()
            .with_context(|| format!("Stability request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Stability", response)?;
        match Self::decode_artifact(&response_payload) {
            Some(uri) => Ok(uri),
            None => bail!("Stability JSON response missing image bytes"),
        }
    }

    fn refine_image(&self, image_uri: &str, instruction: &str, model: &str) -> Result<String> {
        let api_key = self.api_key()?;
        let source = load_source_image(&self.http, "Stability", image_uri)?;
        let mime_type = source
            .mime_type
            .clone()
            .unwrap_or_else(|| "image/png".to_string());
        let init_image = MultipartPart::bytes(source.bytes)
            .file_name("init_image.png")
            .mime_str(&mime_type)
            .context("invalid source image MIME type")?;
        let form = MultipartForm::new()
            .part("init_image", init_image)
            .text("text_prompts[0][text]", instruction.to_string())
            .text("text_prompts[0][weight]", "1")
            .text("cfg_scale", CFG_SCALE.to_string())
            .text("image_strength", IMAGE_STRENGTH)
            .text("samples", "1")
            .text("steps", STEPS.to_string());

        let endpoint = self.endpoint(model, "image-to-image");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .header("Accept", "application/json")
            .multipart(form)
            .send()
            .with_context(|| format!("Stability request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Stability", response)?;
        match Self::decode_artifact(&response_payload) {
            Some(uri) => Ok(uri),
            None => bail!("Stability refinement did not produce a new image"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::StabilityProvider;
    use crate::adapter::GenerativeProvider;

    #[test]
    fn decode_artifact_reads_first_artifact() {
        let payload = json!({"artifacts": [{"base64": "AAA", "finishReason": "SUCCESS"}]});
        assert_eq!(
            StabilityProvider::decode_artifact(&payload).as_deref(),
            Some("data:image/png;base64,AAA")
        );
        assert!(StabilityProvider::decode_artifact(&json!({"artifacts": []})).is_none());
    }

    #[test]
    fn endpoint_uses_model_and_operation() {
        let provider = StabilityProvider {
            api_base: "https://api.stability.test".to_string(),
            api_key: None,
            http: reqwest::blocking::Client::new(),
        };
        assert_eq!(
            provider.endpoint("stable-diffusion-xl-1024-v1-0", "image-to-image"),
            "https://api.stability.test/v1/generation/stable-diffusion-xl-1024-v1-0/image-to-image"
        );
        let err = provider
            .generate_image("boat", "stable-diffusion-xl-1024-v1-0")
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert_eq!(err, "STABILITY_API_KEY not set");
    }
}
