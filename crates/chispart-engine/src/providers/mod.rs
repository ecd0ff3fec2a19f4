mod anthropic;
mod cohere;
mod dryrun;
mod google;
mod openai;
mod stability;

use anyhow::{bail, Result};
use chispart_contracts::media::{is_remote_url, DataUri};
use reqwest::blocking::Client as HttpClient;

use crate::http::{download_image, ImageBytes};

pub use anthropic::AnthropicProvider;
pub use cohere::CohereProvider;
pub use dryrun::DryrunProvider;
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;
pub use stability::StabilityProvider;

/// Resolves the image a refinement starts from: inline data or a remote URL.
pub(crate) fn load_source_image(http: &HttpClient, provider: &str, uri: &str) -> Result<ImageBytes> {
    if is_remote_url(uri) {
        return download_image(http, provider, uri);
    }
    if uri.trim_start().starts_with("data:") {
        let parsed = DataUri::parse(uri)?;
        return Ok(ImageBytes {
            bytes: parsed.bytes,
            mime_type: Some(parsed.mime_type),
        });
    }
    bail!("{provider} cannot read source image: expected a data URI or http(s) URL")
}
