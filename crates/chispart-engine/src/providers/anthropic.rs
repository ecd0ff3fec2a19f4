use anyhow::{bail, Context, Result};
use chispart_contracts::providers::Capability;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::adapter::GenerativeProvider;
use crate::http::{api_base_from_env, non_empty_env, response_json_or_error};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl AnthropicProvider {
    pub fn from_env() -> Self {
        Self {
            api_base: api_base_from_env("ANTHROPIC_API_BASE", "https://api.anthropic.com/v1"),
            api_key: non_empty_env("ANTHROPIC_API_KEY"),
            http: HttpClient::new(),
        }
    }

    fn extract_text(response_payload: &Value) -> String {
        response_payload
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|block| block.get("text").and_then(Value::as_str))
                    .collect::<Vec<&str>>()
                    .join("")
            })
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

impl GenerativeProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::TextGeneration]
    }

    fn generate_text(&self, prompt: &str, model: &str, max_tokens: u32) -> Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("Anthropic client not initialized: ANTHROPIC_API_KEY not set");
        };
        let endpoint = format!("{}/messages", self.api_base);
        let response = self
            .http
            .post(&endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&json!({
                "model": model,
                "max_tokens": max_tokens,
                "messages": [{ "role": "user", "content": prompt }],
            }))
            .send()
            .with_context(|| format!("Anthropic request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Anthropic", response)?;
        Ok(Self::extract_text(&response_payload))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::AnthropicProvider;

    #[test]
    fn extract_text_ignores_non_text_blocks() {
        let payload = json!({
            "content": [
                {"type": "tool_use", "name": "noop"},
                {"type": "text", "text": "[\"a fox\"]"}
            ]
        });
        assert_eq!(AnthropicProvider::extract_text(&payload), "[\"a fox\"]");
        assert_eq!(AnthropicProvider::extract_text(&json!({})), "");
    }
}
