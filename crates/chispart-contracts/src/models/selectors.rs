use super::registry::{ModelRegistry, ModelSpec};
use crate::providers::Capability;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    /// Picks `requested` when the provider serves it for `capability`,
    /// otherwise the provider's first model with that capability.
    pub fn select(
        &self,
        provider: &str,
        requested: Option<&str>,
        capability: Capability,
    ) -> Result<ModelSelection, String> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        let fallback_reason = if let Some(requested_value) = requested {
            if let Some(model) = self.registry.ensure(provider, requested_value, capability) {
                return Ok(ModelSelection {
                    model,
                    requested: Some(requested_value.to_string()),
                    fallback_reason: None,
                });
            }
            format!(
                "Requested model '{requested_value}' unavailable for {} on '{provider}'.",
                capability.label()
            )
        } else {
            "No model specified; using default.".to_string()
        };

        let candidates = self.registry.by_capability(provider, capability);
        let Some(model) = candidates.first().cloned() else {
            return Err(format!(
                "No models available for {} on '{provider}'.",
                capability.label()
            ));
        };
        Ok(ModelSelection {
            model,
            requested: requested.map(str::to_string),
            fallback_reason: Some(fallback_reason),
        })
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::ModelSelector;
    use crate::models::{ModelKind, ModelRegistry, ModelSpec};
    use crate::providers::Capability;

    fn image_model(name: &str) -> ModelSpec {
        ModelSpec {
            name: name.to_string(),
            display_name: name.to_string(),
            provider: "dryrun".to_string(),
            kind: ModelKind::Image,
            capabilities: vec![Capability::ImageGeneration],
            max_tokens: None,
        }
    }

    fn selector_with(models: &[ModelSpec]) -> ModelSelector {
        let mut map = IndexMap::new();
        for model in models {
            map.insert(model.name.clone(), model.clone());
        }
        ModelSelector::new(Some(ModelRegistry::new(Some(map))))
    }

    #[test]
    fn model_selector_falls_back_when_requested_model_unavailable() -> Result<(), String> {
        let selection = selector_with(&[image_model("image-fallback")]).select(
            "dryrun",
            Some("missing"),
            Capability::ImageGeneration,
        )?;
        assert_eq!(selection.model.name, "image-fallback");
        assert_eq!(selection.requested.as_deref(), Some("missing"));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Requested model 'missing' unavailable for image generation on 'dryrun'.")
        );
        Ok(())
    }

    #[test]
    fn model_selector_no_request_uses_default_with_explanation() -> Result<(), String> {
        let selection = selector_with(&[image_model("image-default")]).select(
            "dryrun",
            Some("  "),
            Capability::ImageGeneration,
        )?;
        assert_eq!(selection.model.name, "image-default");
        assert!(selection.requested.is_none());
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("No model specified; using default.")
        );
        Ok(())
    }

    #[test]
    fn model_selector_rejects_model_from_other_provider() {
        let err = selector_with(&[image_model("image-default")])
            .select("openai", Some("image-default"), Capability::ImageGeneration)
            .err()
            .unwrap_or_default();
        assert_eq!(err, "No models available for image generation on 'openai'.");
    }

    #[test]
    fn default_registry_serves_configured_defaults() -> Result<(), String> {
        let selector = ModelSelector::default();
        let image = selector.select("google", None, Capability::ImageGeneration)?;
        assert_eq!(image.model.name, "gemini-2.0-flash-exp");
        let text = selector.select("cohere", Some("command-r"), Capability::TextGeneration)?;
        assert_eq!(text.model.name, "command-r");
        assert!(text.fallback_reason.is_none());
        assert!(selector
            .select("anthropic", None, Capability::ImageGeneration)
            .is_err());
        Ok(())
    }
}
