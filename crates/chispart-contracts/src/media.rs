use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

const IMAGE_EXTENSIONS: &[&str] = &["jpeg", "jpg", "gif", "png", "webp"];

/// Accepts URLs ending in a known image extension (case-insensitive) or inline
/// `data:image...` payloads.
pub fn is_valid_image_url(url: &str) -> bool {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.starts_with("data:image") {
        return true;
    }
    let lowered = trimmed.to_ascii_lowercase();
    let Some((_, ext)) = lowered.rsplit_once('.') else {
        return false;
    };
    IMAGE_EXTENSIONS.contains(&ext)
}

pub fn is_remote_url(url: &str) -> bool {
    let lowered = url.trim().to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DataUri {
    /// Parses `data:<mime>;base64,<payload>`. Non-base64 data URIs are rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let Some(rest) = trimmed.strip_prefix("data:") else {
            bail!("not a data URI");
        };
        let Some((header, payload)) = rest.split_once(',') else {
            bail!("data URI is missing its payload separator");
        };
        let Some(mime_type) = header.strip_suffix(";base64") else {
            bail!("data URI is not base64 encoded");
        };
        let bytes = BASE64
            .decode(payload.trim().as_bytes())
            .context("data URI base64 decode failed")?;
        if bytes.is_empty() {
            bail!("data URI payload is empty");
        }
        let mime_type = if mime_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            mime_type.to_ascii_lowercase()
        };
        Ok(Self { mime_type, bytes })
    }
}

pub fn encode_data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", BASE64.encode(bytes))
}

/// Wraps a bare base64 payload returned by a provider.
pub fn data_uri_from_base64(mime_type: &str, payload: &str) -> String {
    format!("data:{mime_type};base64,{}", payload.trim())
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let lowered = mime_type.trim().to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("gif") {
        return "gif";
    }
    "png"
}

#[cfg(test)]
mod tests {
    use super::{encode_data_uri, extension_for_mime, is_valid_image_url, DataUri};

    #[test]
    fn image_url_validation_matches_extensions_and_data_uris() {
        assert!(is_valid_image_url("https://example.com/cat.PNG"));
        assert!(is_valid_image_url("https://example.com/a.b/photo.jpeg"));
        assert!(is_valid_image_url("data:image/png;base64,AAA"));
        assert!(!is_valid_image_url("https://example.com/page.html"));
        assert!(!is_valid_image_url("https://example.com/cat.png?size=2"));
        assert!(!is_valid_image_url("   "));
        assert!(!is_valid_image_url("data:text/plain;base64,AAA"));
    }

    #[test]
    fn data_uri_parse_decodes_payload_and_mime() -> anyhow::Result<()> {
        let parsed = DataUri::parse("data:image/jpeg;base64,aGVsbG8=")?;
        assert_eq!(parsed.mime_type, "image/jpeg");
        assert_eq!(parsed.bytes, b"hello".to_vec());
        assert_eq!(extension_for_mime(&parsed.mime_type), "jpg");
        assert_eq!(
            encode_data_uri(&parsed.mime_type, &parsed.bytes),
            "data:image/jpeg;base64,aGVsbG8="
        );
        Ok(())
    }

    #[test]
    fn data_uri_parse_rejects_malformed_input() {
        assert!(DataUri::parse("https://example.com/a.png").is_err());
        assert!(DataUri::parse("data:image/png,raw").is_err());
        assert!(DataUri::parse("data:image/png;base64").is_err());
        assert!(DataUri::parse("data:image/png;base64,%%%").is_err());
        assert!(DataUri::parse("data:image/png;base64,").is_err());
    }

    #[test]
    fn extension_defaults_to_png() {
        assert_eq!(extension_for_mime("image/webp"), "webp");
        assert_eq!(extension_for_mime("image/gif"), "gif");
        assert_eq!(extension_for_mime("application/octet-stream"), "png");
    }
}
