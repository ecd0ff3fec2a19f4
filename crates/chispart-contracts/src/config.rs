use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::styles::{ArtStyle, StyleCatalog};

pub const MAX_PROMPTS_OVERALL: usize = 50;
pub const MAX_PROCESSING_JOBS: usize = 10;
pub const GENERATION_DELAY_MS: u64 = 1000;
pub const DOWNLOAD_DELAY_MS: u64 = 1500;
pub const MAX_EXTRACTED_PROMPTS: usize = 10;

pub const DEFAULT_IMAGE_PROVIDER: &str = "google";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_TEXT_PROVIDER: &str = "google";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_STYLE: &str = "cyberpunk";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    pub max_items: usize,
    pub max_jobs: usize,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            max_items: MAX_PROMPTS_OVERALL,
            max_jobs: MAX_PROCESSING_JOBS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub max_prompts_overall: usize,
    pub max_processing_jobs: usize,
    pub generation_delay_ms: u64,
    pub download_delay_ms: u64,
    pub max_extracted_prompts: usize,
    pub image_provider: String,
    pub image_model: String,
    pub text_provider: String,
    pub text_model: String,
    pub default_style: String,
    pub styles: Option<Vec<ArtStyle>>,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            max_prompts_overall: MAX_PROMPTS_OVERALL,
            max_processing_jobs: MAX_PROCESSING_JOBS,
            generation_delay_ms: GENERATION_DELAY_MS,
            download_delay_ms: DOWNLOAD_DELAY_MS,
            max_extracted_prompts: MAX_EXTRACTED_PROMPTS,
            image_provider: DEFAULT_IMAGE_PROVIDER.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            text_provider: DEFAULT_TEXT_PROVIDER.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            default_style: DEFAULT_STYLE.to_string(),
            styles: None,
        }
    }
}

impl StudioConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading config {}", path.display()))?;
        let parsed: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config JSON in {}", path.display()))?;
        Ok(parsed)
    }

    pub fn limits(&self) -> QueueLimits {
        QueueLimits {
            max_items: self.max_prompts_overall,
            max_jobs: self.max_processing_jobs,
        }
    }

    pub fn generation_delay(&self) -> Duration {
        Duration::from_millis(self.generation_delay_ms)
    }

    pub fn download_delay(&self) -> Duration {
        Duration::from_millis(self.download_delay_ms)
    }

    pub fn style_catalog(&self) -> StyleCatalog {
        StyleCatalog::new(self.styles.clone())
    }

    /// Zero delays everywhere; intended for tests and offline dry runs.
    pub fn without_pacing(mut self) -> Self {
        self.generation_delay_ms = 0;
        self.download_delay_ms = 0;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{StudioConfig, MAX_PROCESSING_JOBS};

    #[test]
    fn partial_config_file_keeps_defaults() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("chispart.json");
        fs::write(
            &path,
            r#"{"max_prompts_overall": 5, "image_provider": "openai", "image_model": "dall-e-3"}"#,
        )?;
        let config = StudioConfig::load(&path)?;
        assert_eq!(config.max_prompts_overall, 5);
        assert_eq!(config.max_processing_jobs, MAX_PROCESSING_JOBS);
        assert_eq!(config.image_provider, "openai");
        assert_eq!(config.text_model, "gemini-2.0-flash");
        assert_eq!(config.limits().max_items, 5);
        Ok(())
    }

    #[test]
    fn without_pacing_zeroes_delays() {
        let config = StudioConfig::default().without_pacing();
        assert!(config.generation_delay().is_zero());
        assert!(config.download_delay().is_zero());
    }

    #[test]
    fn invalid_config_reports_path() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("broken.json");
        fs::write(&path, "{not json")?;
        let err = StudioConfig::load(&path).err().map(|err| format!("{err:#}"));
        assert!(err.unwrap_or_default().contains("broken.json"));
        Ok(())
    }
}
