use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtStyle {
    pub name: String,
    pub value: String,
    pub prompt_suffix: String,
}

impl ArtStyle {
    pub fn new(name: &str, value: &str, prompt_suffix: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            prompt_suffix: prompt_suffix.to_string(),
        }
    }

    /// Appends the style suffix verbatim; the prompt is expected to be trimmed already.
    pub fn apply(&self, prompt: &str) -> String {
        format!("{prompt}{}", self.prompt_suffix)
    }
}

/// Ordered style list. The first entry is the fallback for unknown values.
#[derive(Debug, Clone)]
pub struct StyleCatalog {
    styles: Vec<ArtStyle>,
}

impl StyleCatalog {
    /// Values are stored lowercased so lookups match however a config spells them.
    pub fn new(styles: Option<Vec<ArtStyle>>) -> Self {
        let mut styles = styles
            .filter(|rows| !rows.is_empty())
            .unwrap_or_else(default_styles);
        for style in &mut styles {
            style.value = style.value.trim().to_ascii_lowercase();
        }
        Self { styles }
    }

    pub fn get(&self, value: &str) -> Option<&ArtStyle> {
        let needle = value.trim().to_ascii_lowercase();
        self.styles.iter().find(|style| style.value == needle)
    }

    pub fn resolve(&self, value: &str) -> ArtStyle {
        self.get(value)
            .or_else(|| self.styles.first())
            .cloned()
            .unwrap_or_else(|| ArtStyle::new("None", "none", ""))
    }

    pub fn list(&self) -> &[ArtStyle] {
        self.styles.as_slice()
    }

    pub fn values(&self) -> Vec<String> {
        self.styles.iter().map(|style| style.value.clone()).collect()
    }
}

impl Default for StyleCatalog {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_styles() -> Vec<ArtStyle> {
    const LEGIBLE: &str = "any text must be clearly legible, high definition.";
    vec![
        ArtStyle::new(
            "Cyberpunk",
            "cyberpunk",
            &format!(", futuristic cyberpunk style, neon pink and lilac palette, {LEGIBLE}"),
        ),
        ArtStyle::new(
            "Realistic",
            "realistic",
            ", realistic photography, photorealistic, detailed, 8k, high resolution.",
        ),
        ArtStyle::new(
            "Vaporwave",
            "vaporwave",
            &format!(", vaporwave style, neon pastel colors, roman statues, grids, sunset, {LEGIBLE}"),
        ),
        ArtStyle::new(
            "Synthwave",
            "synthwave",
            &format!(", synthwave style, neon grid, palm trees, retro sun, vibrant colors, {LEGIBLE}"),
        ),
        ArtStyle::new(
            "Dark Fantasy",
            "dark_fantasy",
            &format!(", dark fantasy style, epic, atmospheric, detailed, {LEGIBLE}"),
        ),
        ArtStyle::new(
            "Pixel Art",
            "pixel_art",
            ", pixel art style, 16-bit, vibrant colors, any text must be clearly legible.",
        ),
        ArtStyle::new(
            "90s Anime",
            "90s_anime",
            ", 90s anime style, cel shading, vibrant colors, aesthetic, high definition.",
        ),
        ArtStyle::new(
            "Comic Book",
            "comic_book",
            ", american comic book style, bold line art, flat colors, halftone dots, dynamic, high definition.",
        ),
        ArtStyle::new(
            "Cinematic Photo",
            "cinematic_photo",
            ", cinematic photography, film still, dramatic lighting, deep colors, ultra detailed, 8k.",
        ),
        ArtStyle::new(
            "Watercolor",
            "watercolor",
            ", vibrant watercolor painting, loose strokes, paint splatters, textured paper, artistic.",
        ),
        ArtStyle::new(
            "Steampunk",
            "steampunk",
            ", steampunk style, intricate gears and clocks, sepia and bronze tones, victorian aesthetic, detailed.",
        ),
        ArtStyle::new(
            "Minimalist Line Art",
            "line_art",
            ", minimalist line art, clean outlines, single color on white background, simple, modern.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::{ArtStyle, StyleCatalog};

    #[test]
    fn default_catalog_starts_with_cyberpunk() {
        let catalog = StyleCatalog::default();
        assert_eq!(catalog.list().len(), 12);
        assert_eq!(catalog.list()[0].value, "cyberpunk");
        assert_eq!(catalog.resolve("CYBERPUNK").name, "Cyberpunk");
    }

    #[test]
    fn unknown_style_falls_back_to_first_entry() {
        let catalog = StyleCatalog::default();
        assert!(catalog.get("baroque").is_none());
        assert_eq!(catalog.resolve("baroque").value, "cyberpunk");
    }

    #[test]
    fn custom_catalog_replaces_defaults_and_empty_list_does_not() {
        let custom = StyleCatalog::new(Some(vec![ArtStyle::new(
            "Cyberpunk",
            "cyberpunk",
            ", cyberpunk style",
        )]));
        assert_eq!(custom.list().len(), 1);
        assert_eq!(
            custom.resolve("cyberpunk").apply("a lighthouse"),
            "a lighthouse, cyberpunk style"
        );

        let empty = StyleCatalog::new(Some(Vec::new()));
        assert_eq!(empty.list().len(), 12);
    }

    #[test]
    fn configured_values_match_in_any_case() {
        let catalog = StyleCatalog::new(Some(vec![
            ArtStyle::new("Pixel Art", " Pixel-Art ", ", pixel art"),
            ArtStyle::new("Noir", "NOIR", ", film noir"),
        ]));
        assert_eq!(catalog.values(), vec!["pixel-art", "noir"]);
        assert_eq!(catalog.get("noir").map(|style| style.name.as_str()), Some("Noir"));
        assert_eq!(catalog.resolve("PIXEL-ART").prompt_suffix, ", pixel art");
    }
}
