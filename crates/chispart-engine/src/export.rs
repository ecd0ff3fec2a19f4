use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chispart_contracts::media::{extension_for_mime, is_remote_url, DataUri};
use chispart_contracts::queue::{ItemId, PromptJob};
use chrono::{Local, NaiveDate};
use reqwest::blocking::Client as HttpClient;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::http::{download_image, error_chain_text};

const PROMPT_SLUG_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    Individual,
    Archive,
}

impl ExportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Archive => "archive",
        }
    }
}

impl FromStr for ExportMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "individual" | "files" => Ok(Self::Individual),
            "archive" | "zip" => Ok(Self::Archive),
            other => Err(format!("unknown export mode '{other}' (expected files or zip)")),
        }
    }
}

/// Snapshot of one completed job, taken so the export can run without the
/// queue lock held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub job_id: ItemId,
    pub style: String,
    pub prompt: String,
    pub image_url: String,
}

impl ExportEntry {
    pub fn from_job(job: &PromptJob) -> Option<Self> {
        Some(Self {
            job_id: job.id(),
            style: job.art_style_used().to_string(),
            prompt: job.original_prompt().to_string(),
            image_url: job.image_url()?.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSkip {
    pub job_id: ItemId,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub mode: ExportMode,
    /// Files created on disk: one per image, or the single archive.
    pub written: Vec<PathBuf>,
    /// Generated names of the exported images, in export order.
    pub entries: Vec<String>,
    pub skipped: Vec<ExportSkip>,
}

impl ExportReport {
    fn new(mode: ExportMode) -> Self {
        Self {
            mode,
            written: Vec::new(),
            entries: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

struct DecodedImage {
    bytes: Vec<u8>,
    extension: &'static str,
}

pub struct Exporter {
    http: HttpClient,
    download_delay: Duration,
}

impl Exporter {
    pub fn new(download_delay: Duration) -> Self {
        Self {
            http: HttpClient::new(),
            download_delay,
        }
    }

    /// Writes every entry into `out_dir`. Items that cannot be decoded or
    /// written are reported in `skipped` and never abort the rest.
    pub fn export(
        &self,
        entries: &[ExportEntry],
        mode: ExportMode,
        out_dir: &Path,
    ) -> Result<ExportReport> {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("failed creating export dir {}", out_dir.display()))?;
        match mode {
            ExportMode::Individual => self.write_individual(entries, out_dir),
            ExportMode::Archive => {
                let path = out_dir.join(archive_name(Local::now().date_naive()));
                self.write_archive(entries, &path)
            }
        }
    }

    fn write_individual(&self, entries: &[ExportEntry], out_dir: &Path) -> Result<ExportReport> {
        let mut report = ExportReport::new(ExportMode::Individual);
        for (index, entry) in entries.iter().enumerate() {
            let decoded = match self.decode(entry) {
                Ok(decoded) => decoded,
                Err(err) => {
                    skip(&mut report, entry, &err);
                    continue;
                }
            };
            if !report.written.is_empty() && !self.download_delay.is_zero() {
                thread::sleep(self.download_delay);
            }
            let name = export_filename(index + 1, &entry.style, &entry.prompt, decoded.extension);
            let path = out_dir.join(&name);
            let written = fs::write(&path, &decoded.bytes)
                .with_context(|| format!("failed writing {}", path.display()));
            if let Err(err) = written {
                skip(&mut report, entry, &err);
                continue;
            }
            report.written.push(path);
            report.entries.push(name);
        }
        Ok(report)
    }

    fn write_archive(&self, entries: &[ExportEntry], path: &Path) -> Result<ExportReport> {
        let mut report = ExportReport::new(ExportMode::Archive);
        let mut decoded_entries = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            match self.decode(entry) {
                Ok(decoded) => {
                    let name =
                        export_filename(index + 1, &entry.style, &entry.prompt, decoded.extension);
                    decoded_entries.push((name, decoded.bytes));
                }
                Err(err) => skip(&mut report, entry, &err),
            }
        }
        if decoded_entries.is_empty() {
            return Ok(report);
        }

        let file = fs::File::create(path)
            .with_context(|| format!("failed creating archive {}", path.display()))?;
        let mut writer = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, bytes) in decoded_entries {
            writer
                .start_file(name.as_str(), options)
                .with_context(|| format!("failed adding {name} to archive"))?;
            writer.write_all(&bytes)?;
            report.entries.push(name);
        }
        writer.finish().context("failed finalizing archive")?;
        report.written.push(path.to_path_buf());
        Ok(report)
    }

    fn decode(&self, entry: &ExportEntry) -> Result<DecodedImage> {
        let (bytes, mime_type) = if is_remote_url(&entry.image_url) {
            let fetched = download_image(&self.http, "export", &entry.image_url)?;
            (fetched.bytes, fetched.mime_type)
        } else if entry.image_url.trim_start().starts_with("data:") {
            let parsed = DataUri::parse(&entry.image_url)?;
            (parsed.bytes, Some(parsed.mime_type))
        } else {
            bail!("unsupported image reference");
        };
        let mime_type = mime_type
            .filter(|mime| mime.starts_with("image/"))
            .or_else(|| {
                image::guess_format(&bytes)
                    .ok()
                    .map(|format| format.to_mime_type().to_string())
            });
        let Some(mime_type) = mime_type else {
            bail!("payload is not a recognizable image");
        };
        Ok(DecodedImage {
            bytes,
            extension: extension_for_mime(&mime_type),
        })
    }
}

fn skip(report: &mut ExportReport, entry: &ExportEntry, err: &anyhow::Error) {
    let error = error_chain_text(err, 300);
    tracing::warn!(job_id = entry.job_id, "export skipped image: {error}");
    report.skipped.push(ExportSkip {
        job_id: entry.job_id,
        error,
    });
}

fn slug(value: &str) -> String {
    value
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

/// `image_<NN>_<style>_<prompt>.<ext>`; `index` is 1-based.
pub fn export_filename(index: usize, style: &str, prompt: &str, extension: &str) -> String {
    let prompt_slug: String = slug(prompt).chars().take(PROMPT_SLUG_CHARS).collect();
    format!(
        "image_{index:02}_{}_{prompt_slug}.{extension}",
        slug(style).to_ascii_lowercase()
    )
}

pub fn archive_name(date: NaiveDate) -> String {
    format!("chispart_images_{}.zip", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Read;
    use std::time::Duration;

    use chispart_contracts::media::encode_data_uri;
    use chrono::NaiveDate;

    use super::{archive_name, export_filename, ExportEntry, ExportMode, Exporter};

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];

    fn entry(job_id: u64, prompt: &str, image_url: String) -> ExportEntry {
        ExportEntry {
            job_id,
            style: "Pixel Art".to_string(),
            prompt: prompt.to_string(),
            image_url,
        }
    }

    #[test]
    fn filename_slugs_style_and_prompt() -> anyhow::Result<()> {
        assert_eq!(
            export_filename(3, "Pixel Art", "a lighthouse, at night! with a very long tail", "png"),
            "image_03_pixel_art_a_lighthouse__at_night__with_a.png"
        );
        let date = NaiveDate::from_ymd_opt(2026, 10, 18)
            .ok_or_else(|| anyhow::anyhow!("invalid date"))?;
        assert_eq!(archive_name(date), "chispart_images_2026-10-18.zip");
        Ok(())
    }

    #[test]
    fn archive_holds_one_entry_per_decodable_image() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let exporter = Exporter::new(Duration::ZERO);
        let entries = vec![
            entry(1, "a fox", encode_data_uri("image/png", PNG_MAGIC)),
            entry(2, "broken", "data:image/png;base64,%%%".to_string()),
            entry(4, "a fox", encode_data_uri("image/jpeg", &[0xff, 0xd8, 0xff, 0xe0])),
        ];

        let report = exporter.export(&entries, ExportMode::Archive, temp.path())?;
        assert_eq!(report.written.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].job_id, 2);
        assert_eq!(
            report.entries,
            vec![
                "image_01_pixel_art_a_fox.png".to_string(),
                "image_03_pixel_art_a_fox.jpg".to_string()
            ]
        );

        let mut archive = zip::ZipArchive::new(fs::File::open(&report.written[0])?)?;
        assert_eq!(archive.len(), 2);
        let mut first = Vec::new();
        archive.by_name("image_01_pixel_art_a_fox.png")?.read_to_end(&mut first)?;
        assert_eq!(first, PNG_MAGIC);
        Ok(())
    }

    #[test]
    fn individual_mode_writes_files_and_sniffs_missing_mime() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let exporter = Exporter::new(Duration::ZERO);
        let entries = vec![
            entry(1, "one", encode_data_uri("application/octet-stream", PNG_MAGIC)),
            entry(2, "two", "ftp://archive.test/two.png".to_string()),
        ];

        let report = exporter.export(&entries, ExportMode::Individual, temp.path())?;
        assert_eq!(report.entries, vec!["image_01_pixel_art_one.png".to_string()]);
        assert_eq!(fs::read(temp.path().join("image_01_pixel_art_one.png"))?, PNG_MAGIC);
        assert_eq!(report.skipped.len(), 1);
        Ok(())
    }

    #[test]
    fn unwritable_target_is_skipped_and_the_rest_still_written() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        fs::create_dir(temp.path().join("image_02_pixel_art_two.png"))?;
        let exporter = Exporter::new(Duration::ZERO);
        let entries = vec![
            entry(1, "one", encode_data_uri("image/png", PNG_MAGIC)),
            entry(2, "two", encode_data_uri("image/png", PNG_MAGIC)),
            entry(3, "three", encode_data_uri("image/png", PNG_MAGIC)),
        ];

        let report = exporter.export(&entries, ExportMode::Individual, temp.path())?;
        assert_eq!(
            report.entries,
            vec![
                "image_01_pixel_art_one.png".to_string(),
                "image_03_pixel_art_three.png".to_string()
            ]
        );
        assert_eq!(report.written.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].job_id, 2);
        assert_eq!(fs::read(temp.path().join("image_03_pixel_art_three.png"))?, PNG_MAGIC);
        Ok(())
    }

    #[test]
    fn export_mode_parses_aliases() {
        assert_eq!("zip".parse::<ExportMode>(), Ok(ExportMode::Archive));
        assert_eq!("files".parse::<ExportMode>(), Ok(ExportMode::Individual));
        assert!("tar".parse::<ExportMode>().is_err());
    }
}
