use std::collections::BTreeMap;

use anyhow::{bail, Result};
use chispart_contracts::models::{ModelSelector, ModelSpec};
use chispart_contracts::providers::{default_catalog, Capability, ProviderCatalog};
use thiserror::Error;

use crate::extract::{extraction_instruction, parse_prompt_list};
use crate::http::error_chain_text;
use crate::providers::{
    AnthropicProvider, CohereProvider, DryrunProvider, GoogleProvider, OpenAiProvider,
    StabilityProvider,
};

pub const DEFAULT_MAX_TOKENS: u32 = 1000;
const ERROR_MAX_CHARS: usize = 600;

/// One third-party back-end. Implementations only need the operations they
/// advertise in `capabilities`; the adapter never calls the others.
pub trait GenerativeProvider: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> &[Capability];

    /// Returns a `data:` URI or a remote image URL.
    fn generate_image(&self, prompt: &str, model: &str) -> Result<String> {
        let _ = (prompt, model);
        bail!("{} does not implement image generation", self.name())
    }

    fn generate_text(&self, prompt: &str, model: &str, max_tokens: u32) -> Result<String> {
        let _ = (prompt, model, max_tokens);
        bail!("{} does not implement text generation", self.name())
    }

    fn refine_image(&self, image_uri: &str, instruction: &str, model: &str) -> Result<String> {
        let _ = (image_uri, instruction, model);
        bail!("{} does not implement image refinement", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub provider: String,
    pub message: String,
}

impl ProviderError {
    fn new(provider: &str, message: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// Provider plus model a call is routed to. An empty model means "provider default".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRoute {
    pub provider: String,
    pub model: String,
}

impl ProviderRoute {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into().trim().to_ascii_lowercase(),
            model: model.into().trim().to_string(),
        }
    }
}

/// Single entry point over every registered provider. Failures come back as
/// `ProviderError`, never as a provider-specific error type.
pub struct ProviderAdapter {
    providers: BTreeMap<String, Box<dyn GenerativeProvider>>,
    models: ModelSelector,
    catalog: ProviderCatalog,
}

impl Default for ProviderAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAdapter {
    pub fn new() -> Self {
        Self {
            providers: BTreeMap::new(),
            models: ModelSelector::default(),
            catalog: default_catalog(),
        }
    }

    /// Registers every built-in provider. Credentials and API bases are read
    /// from the environment here and nowhere else.
    pub fn with_default_providers() -> Self {
        let mut adapter = Self::new();
        adapter.register(DryrunProvider);
        adapter.register(GoogleProvider::from_env());
        adapter.register(OpenAiProvider::from_env());
        adapter.register(AnthropicProvider::from_env());
        adapter.register(CohereProvider::from_env());
        adapter.register(StabilityProvider::from_env());
        adapter
    }

    pub fn register<P: GenerativeProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn catalog(&self) -> &ProviderCatalog {
        &self.catalog
    }

    pub fn models_for(&self, provider: &str) -> Vec<ModelSpec> {
        self.models.registry.by_provider(provider)
    }

    pub fn supports(&self, provider: &str, capability: Capability) -> bool {
        self.providers
            .get(provider)
            .map(|row| row.capabilities().contains(&capability))
            .unwrap_or(false)
    }

    pub fn generate_image(&self, prompt: &str, route: &ProviderRoute) -> Result<String, ProviderError> {
        let (provider, model) = self.prepare(route, Capability::ImageGeneration)?;
        let image = provider
            .generate_image(prompt, &model)
            .map_err(|err| wrap_error(&route.provider, "generating image", &err))?;
        non_empty_payload(&route.provider, image, "media")
    }

    pub fn generate_text(
        &self,
        prompt: &str,
        route: &ProviderRoute,
        max_tokens: Option<u32>,
    ) -> Result<String, ProviderError> {
        let (provider, model) = self.prepare(route, Capability::TextGeneration)?;
        let max_tokens = max_tokens
            .or_else(|| self.models.registry.get(&model).and_then(|spec| spec.max_tokens))
            .map(|limit| limit.min(DEFAULT_MAX_TOKENS))
            .unwrap_or(DEFAULT_MAX_TOKENS);
        let text = provider
            .generate_text(prompt, &model, max_tokens)
            .map_err(|err| wrap_error(&route.provider, "generating text", &err))?;
        non_empty_payload(&route.provider, text, "content")
    }

    pub fn refine_image(
        &self,
        original_image_uri: &str,
        instruction: &str,
        route: &ProviderRoute,
    ) -> Result<String, ProviderError> {
        let (provider, model) = self.prepare(route, Capability::ImageRefinement)?;
        let refined = provider
            .refine_image(original_image_uri, instruction, &model)
            .map_err(|err| wrap_error(&route.provider, "refining image", &err))?;
        non_empty_payload(&route.provider, refined, "media")
    }

    /// Provider failures are errors; a malformed reply is not and yields
    /// whatever could be salvaged, possibly nothing.
    pub fn extract_prompts(
        &self,
        text_block: &str,
        route: &ProviderRoute,
        max_prompts: usize,
    ) -> Result<Vec<String>, ProviderError> {
        if text_block.trim().is_empty() || max_prompts == 0 {
            return Ok(Vec::new());
        }
        let instruction = extraction_instruction(text_block, max_prompts);
        let (provider, model) = self.prepare(route, Capability::TextGeneration)?;
        let reply = provider
            .generate_text(&instruction, &model, DEFAULT_MAX_TOKENS)
            .map_err(|err| wrap_error(&route.provider, "extracting prompts", &err))?;
        Ok(parse_prompt_list(&reply, max_prompts))
    }

    fn prepare(
        &self,
        route: &ProviderRoute,
        capability: Capability,
    ) -> Result<(&dyn GenerativeProvider, String), ProviderError> {
        let Some(provider) = self.providers.get(&route.provider) else {
            return Err(ProviderError::new(
                &route.provider,
                format!("Unsupported provider: {}", route.provider),
            ));
        };
        if !provider.capabilities().contains(&capability) {
            return Err(ProviderError::new(
                &route.provider,
                format!(
                    "Provider {} does not support {}",
                    route.provider,
                    capability.label()
                ),
            ));
        }
        let model = self.resolve_model(route, capability)?;
        Ok((provider.as_ref(), model))
    }

    fn resolve_model(
        &self,
        route: &ProviderRoute,
        capability: Capability,
    ) -> Result<String, ProviderError> {
        if !route.model.is_empty() {
            return Ok(route.model.clone());
        }
        let selection = self
            .models
            .select(&route.provider, None, capability)
            .map_err(|message| ProviderError::new(&route.provider, message))?;
        if let Some(reason) = selection.fallback_reason.as_deref() {
            tracing::debug!(
                provider = %route.provider,
                model = %selection.model.name,
                "{reason}"
            );
        }
        Ok(selection.model.name)
    }
}

fn wrap_error(provider: &str, action: &str, err: &anyhow::Error) -> ProviderError {
    ProviderError::new(
        provider,
        format!("Error {action}: {}", error_chain_text(err, ERROR_MAX_CHARS)),
    )
}

fn non_empty_payload(provider: &str, payload: String, kind: &str) -> Result<String, ProviderError> {
    if payload.trim().is_empty() {
        return Err(ProviderError::new(
            provider,
            format!("{provider} returned no {kind}"),
        ));
    }
    Ok(payload)
}
