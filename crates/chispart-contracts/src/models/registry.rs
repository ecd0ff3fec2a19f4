use indexmap::IndexMap;
use serde::Serialize;

use crate::providers::Capability;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Text,
    Image,
    Multimodal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSpec {
    pub name: String,
    pub display_name: String,
    pub provider: String,
    pub kind: ModelKind,
    pub capabilities: Vec<Capability>,
    pub max_tokens: Option<u32>,
}

impl ModelSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_provider(&self, provider: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.provider == provider)
            .cloned()
            .collect()
    }

    pub fn by_capability(&self, provider: &str, capability: Capability) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.provider == provider && model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, provider: &str, name: &str, capability: Capability) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.provider == provider && model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    use Capability::{ImageGeneration, ImageRefinement, TextGeneration};

    let mut map = IndexMap::new();

    let mut insert = |name: &str,
                      display_name: &str,
                      provider: &str,
                      kind: ModelKind,
                      capabilities: &[Capability],
                      max_tokens: Option<u32>| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                display_name: display_name.to_string(),
                provider: provider.to_string(),
                kind,
                capabilities: capabilities.to_vec(),
                max_tokens,
            },
        );
    };

    insert(
        "gemini-2.0-flash-exp",
        "Gemini 2.0 Flash Experimental",
        "google",
        ModelKind::Multimodal,
        &[ImageGeneration, ImageRefinement, TextGeneration],
        Some(8192),
    );
    insert(
        "gemini-2.0-flash",
        "Gemini 2.0 Flash",
        "google",
        ModelKind::Multimodal,
        &[TextGeneration],
        Some(8192),
    );
    insert(
        "gemini-1.5-pro",
        "Gemini 1.5 Pro",
        "google",
        ModelKind::Multimodal,
        &[TextGeneration],
        Some(8192),
    );
    insert(
        "dall-e-3",
        "DALL-E 3",
        "openai",
        ModelKind::Image,
        &[ImageGeneration, ImageRefinement],
        None,
    );
    insert(
        "gpt-4o",
        "GPT-4o",
        "openai",
        ModelKind::Multimodal,
        &[TextGeneration],
        Some(4096),
    );
    insert(
        "gpt-4-turbo",
        "GPT-4 Turbo",
        "openai",
        ModelKind::Text,
        &[TextGeneration],
        Some(4096),
    );
    insert(
        "claude-3-5-sonnet-20241022",
        "Claude 3.5 Sonnet",
        "anthropic",
        ModelKind::Multimodal,
        &[TextGeneration],
        Some(8192),
    );
    insert(
        "claude-3-opus-20240229",
        "Claude 3 Opus",
        "anthropic",
        ModelKind::Multimodal,
        &[TextGeneration],
        Some(4096),
    );
    insert(
        "claude-3-haiku-20240307",
        "Claude 3 Haiku",
        "anthropic",
        ModelKind::Text,
        &[TextGeneration],
        Some(4096),
    );
    insert(
        "command-r-plus",
        "Command R+",
        "cohere",
        ModelKind::Text,
        &[TextGeneration],
        Some(4000),
    );
    insert(
        "command-r",
        "Command R",
        "cohere",
        ModelKind::Text,
        &[TextGeneration],
        Some(4000),
    );
    insert(
        "stable-diffusion-xl-1024-v1-0",
        "Stable Diffusion XL 1.0",
        "stability",
        ModelKind::Image,
        &[ImageGeneration, ImageRefinement],
        None,
    );
    insert(
        "dryrun-image-1",
        "Dry run image",
        "dryrun",
        ModelKind::Image,
        &[ImageGeneration, ImageRefinement],
        None,
    );
    insert(
        "dryrun-text-1",
        "Dry run text",
        "dryrun",
        ModelKind::Text,
        &[TextGeneration],
        Some(8192),
    );

    map
}
