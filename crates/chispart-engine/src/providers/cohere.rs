use anyhow::{bail, Context, Result};
use chispart_contracts::providers::Capability;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::adapter::GenerativeProvider;
use crate::http::{api_base_from_env, non_empty_env, response_json_or_error};

pub struct CohereProvider {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl CohereProvider {
    pub fn from_env() -> Self {
        Self {
            api_base: api_base_from_env("COHERE_API_BASE", "https://api.cohere.ai/v1"),
            api_key: non_empty_env("COHERE_API_KEY"),
            http: HttpClient::new(),
        }
    }

    // `/chat` answers in `text`; the legacy `/generate` shape is still accepted.
    fn extract_text(response_payload: &Value) -> String {
        response_payload
            .get("text")
            .and_then(Value::as_str)
            .or_else(|| {
                response_payload
                    .get("generations")
                    .and_then(Value::as_array)
                    .and_then(|rows| rows.first())
                    .and_then(|row| row.get("text"))
                    .and_then(Value::as_str)
            })
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

impl GenerativeProvider for CohereProvider {
    fn name(&self) -> &str {
        "cohere"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::TextGeneration]
    }

    fn generate_text(&self, prompt: &str, model: &str, max_tokens: u32) -> Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("Cohere client not initialized: COHERE_API_KEY not set");
        };
        let endpoint = format!("{}/chat", self.api_base);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(&json!({
                "model": model,
                "message": prompt,
                "max_tokens": max_tokens,
            }))
            .send()
            .with_context(|| format!("Cohere request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Cohere", response)?;
        Ok(Self::extract_text(&response_payload))
    }
}
