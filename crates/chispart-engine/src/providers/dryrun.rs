use std::io::Cursor;

use anyhow::{Context, Result};
use chispart_contracts::media::encode_data_uri;
use chispart_contracts::providers::Capability;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::adapter::GenerativeProvider;
use crate::extract::TEXT_MARKER;

const DRYRUN_SIZE: u32 = 64;

/// Offline provider. Images are solid squares whose colour is derived from the
/// prompt; text replies split the analyzed text into sentences.
pub struct DryrunProvider;

impl GenerativeProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn capabilities(&self) -> &[Capability] {
        &[
            Capability::ImageGeneration,
            Capability::TextGeneration,
            Capability::ImageRefinement,
        ]
    }

    fn generate_image(&self, prompt: &str, model: &str) -> Result<String> {
        solid_png_data_uri(&format!("{model}\n{prompt}"))
    }

    fn generate_text(&self, prompt: &str, _model: &str, _max_tokens: u32) -> Result<String> {
        let Some((_, text)) = prompt.split_once(TEXT_MARKER) else {
            return Ok(prompt.trim().to_string());
        };
        let sentences = text
            .split(['.', '!', '?', '\n'])
            .map(str::trim)
            .filter(|sentence| !sentence.is_empty())
            .map(|sentence| Value::String(sentence.to_string()))
            .collect::<Vec<Value>>();
        Ok(serde_json::to_string(&Value::Array(sentences))?)
    }

    fn refine_image(&self, image_uri: &str, instruction: &str, model: &str) -> Result<String> {
        solid_png_data_uri(&format!("{model}\n{image_uri}\n{instruction}"))
    }
}

fn solid_png_data_uri(seed_text: &str) -> Result<String> {
    let (r, g, b) = color_from_prompt(seed_text);
    let mut image = RgbImage::new(DRYRUN_SIZE, DRYRUN_SIZE);
    for pixel in image.pixels_mut() {
        *pixel = Rgb([r, g, b]);
    }
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("failed to encode dryrun image")?;
    Ok(encode_data_uri("image/png", &bytes))
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use chispart_contracts::media::DataUri;

    use super::DryrunProvider;
    use crate::adapter::GenerativeProvider;
    use crate::extract::{extraction_instruction, parse_prompt_list};

    #[test]
    fn dryrun_image_is_decodable_png() -> anyhow::Result<()> {
        let uri = DryrunProvider.generate_image("boat", "dryrun-image-1")?;
        let parsed = DataUri::parse(&uri)?;
        let decoded = image::load_from_memory(&parsed.bytes)?;
        assert_eq!(decoded.width(), 64);
        assert_eq!(parsed.mime_type, "image/png");
        Ok(())
    }

    #[test]
    fn dryrun_is_deterministic_and_refinement_changes_image() -> anyhow::Result<()> {
        let first = DryrunProvider.generate_image("boat", "m")?;
        let second = DryrunProvider.generate_image("boat", "m")?;
        assert_eq!(first, second);
        let refined = DryrunProvider.refine_image(&first, "make it night", "m")?;
        assert_ne!(refined, first);
        Ok(())
    }

    #[test]
    fn dryrun_text_answers_extraction_with_json() -> anyhow::Result<()> {
        let instruction = extraction_instruction("A fox runs. The moon rises!", 10);
        let reply = DryrunProvider.generate_text(&instruction, "dryrun-text-1", 1000)?;
        assert_eq!(
            parse_prompt_list(&reply, 10),
            vec!["A fox runs", "The moon rises"]
        );
        Ok(())
    }
}
