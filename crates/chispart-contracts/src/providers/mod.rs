use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ImageGeneration,
    TextGeneration,
    ImageRefinement,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::ImageGeneration,
        Capability::TextGeneration,
        Capability::ImageRefinement,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImageGeneration => "image",
            Self::TextGeneration => "text",
            Self::ImageRefinement => "refine",
        }
    }

    /// Phrase used in user-facing errors ("does not support image generation").
    pub fn label(self) -> &'static str {
        match self {
            Self::ImageGeneration => "image generation",
            Self::TextGeneration => "text generation",
            Self::ImageRefinement => "image refinement",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "image" | "image_generation" => Ok(Self::ImageGeneration),
            "text" | "text_generation" => Ok(Self::TextGeneration),
            "refine" | "edit" | "image_refinement" => Ok(Self::ImageRefinement),
            other => Err(format!("Unknown capability '{other}'.")),
        }
    }
}

pub trait NamedProvider {
    fn name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct ProviderRegistry<T: NamedProvider> {
    providers: Vec<T>,
}

impl<T: NamedProvider> ProviderRegistry<T> {
    pub fn new(providers: Vec<T>) -> Self {
        Self { providers }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.providers
            .iter()
            .find(|provider| provider.name() == name)
    }

    pub fn list(&self) -> Vec<String> {
        let mut names = self
            .providers
            .iter()
            .map(|provider| provider.name().to_string())
            .collect::<Vec<String>>();
        names.sort();
        names
    }

    pub fn providers(&self) -> &[T] {
        self.providers.as_slice()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub name: String,
    pub capabilities: Vec<Capability>,
    /// Environment variables checked for credentials, in priority order.
    pub credential_env: Vec<String>,
}

impl ProviderDescriptor {
    fn new(id: &str, name: &str, capabilities: &[Capability], credential_env: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            capabilities: capabilities.to_vec(),
            credential_env: credential_env.iter().map(|key| key.to_string()).collect(),
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn requires_api_key(&self) -> bool {
        !self.credential_env.is_empty()
    }
}

impl NamedProvider for ProviderDescriptor {
    fn name(&self) -> &str {
        self.id.as_str()
    }
}

pub type ProviderCatalog = ProviderRegistry<ProviderDescriptor>;

pub fn default_catalog() -> ProviderCatalog {
    use Capability::{ImageGeneration, ImageRefinement, TextGeneration};

    ProviderRegistry::new(vec![
        ProviderDescriptor::new(
            "google",
            "Google Gemini",
            &[ImageGeneration, TextGeneration, ImageRefinement],
            &["GOOGLE_AI_API_KEY", "GEMINI_API_KEY"],
        ),
        ProviderDescriptor::new(
            "openai",
            "OpenAI",
            &[ImageGeneration, TextGeneration, ImageRefinement],
            &["OPENAI_API_KEY"],
        ),
        ProviderDescriptor::new(
            "anthropic",
            "Anthropic Claude",
            &[TextGeneration],
            &["ANTHROPIC_API_KEY"],
        ),
        ProviderDescriptor::new("cohere", "Cohere", &[TextGeneration], &["COHERE_API_KEY"]),
        ProviderDescriptor::new(
            "stability",
            "Stability AI",
            &[ImageGeneration, ImageRefinement],
            &["STABILITY_API_KEY"],
        ),
        ProviderDescriptor::new(
            "dryrun",
            "Offline dry run",
            &[ImageGeneration, TextGeneration, ImageRefinement],
            &[],
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::{default_catalog, Capability, NamedProvider, ProviderRegistry};

    #[derive(Clone, Debug)]
    struct DummyProvider {
        name: String,
    }

    impl NamedProvider for DummyProvider {
        fn name(&self) -> &str {
            self.name.as_str()
        }
    }

    #[test]
    fn registry_lists_sorted_but_keeps_insertion_order() {
        let registry = ProviderRegistry::new(vec![
            DummyProvider {
                name: "z".to_string(),
            },
            DummyProvider {
                name: "a".to_string(),
            },
            DummyProvider {
                name: "m".to_string(),
            },
        ]);
        assert_eq!(registry.list(), vec!["a", "m", "z"]);
        assert_eq!(
            registry
                .providers()
                .iter()
                .map(|provider| provider.name().to_string())
                .collect::<Vec<String>>(),
            vec!["z", "a", "m"]
        );
    }

    #[test]
    fn catalog_marks_text_only_providers() {
        let catalog = default_catalog();
        let anthropic = catalog.get("anthropic");
        assert_eq!(
            anthropic.map(|row| row.supports(Capability::ImageGeneration)),
            Some(false)
        );
        assert_eq!(
            anthropic.map(|row| row.supports(Capability::TextGeneration)),
            Some(true)
        );
        assert_eq!(
            catalog.get("dryrun").map(|row| row.requires_api_key()),
            Some(false)
        );
        assert!(catalog.get("midjourney").is_none());
    }

    #[test]
    fn capability_parses_aliases() {
        assert_eq!("edit".parse::<Capability>(), Ok(Capability::ImageRefinement));
        assert_eq!("TEXT".parse::<Capability>(), Ok(Capability::TextGeneration));
        assert!("audio".parse::<Capability>().is_err());
        assert_eq!(Capability::ImageGeneration.label(), "image generation");
    }
}
