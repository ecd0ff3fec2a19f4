use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::events::now_utc_iso;
use crate::queue::JobStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: String,
    pub job_id: Option<u64>,
    pub prompt: String,
    pub styled_prompt: String,
    pub artistic_style: Option<String>,
    pub image_url: Option<String>,
    pub refined_prompt: Option<String>,
    pub status: JobStatus,
    /// Empty until the job is picked up by a batch.
    pub provider: String,
    pub model: String,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGeneration {
    pub job_id: Option<u64>,
    pub prompt: String,
    pub styled_prompt: String,
    pub artistic_style: Option<String>,
}

/// One line of the log: the latest state of a record, or its removal.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntry {
    Put(GenerationRecord),
    Delete { id: String },
}

/// Generation records kept as an append-only JSONL log.
///
/// Opening replays the log into memory (last line per id wins); every change
/// appends one line, so a write costs the size of one record.
#[derive(Debug)]
pub struct GenerationStore {
    path: PathBuf,
    records: IndexMap<String, GenerationRecord>,
}

impl GenerationStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = replay(&path)?;
        Ok(Self { path, records })
    }

    pub fn create(&mut self, input: NewGeneration) -> Result<GenerationRecord> {
        let now = now_utc_iso();
        let record = GenerationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: input.job_id,
            prompt: input.prompt,
            styled_prompt: input.styled_prompt,
            artistic_style: input.artistic_style,
            image_url: None,
            refined_prompt: None,
            status: JobStatus::Pending,
            provider: String::new(),
            model: String::new(),
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
        };
        self.put(record.clone())?;
        Ok(record)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&GenerationRecord> {
        self.records.get(id)
    }

    pub fn update_status(
        &mut self,
        id: &str,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<GenerationRecord> {
        self.modify(id, |record| {
            record.status = status;
            record.error_message = error_message;
        })
    }

    /// Records the provider route the job is generated with.
    pub fn assign_route(&mut self, id: &str, provider: &str, model: &str) -> Result<GenerationRecord> {
        self.modify(id, |record| {
            record.provider = provider.to_string();
            record.model = model.to_string();
        })
    }

    pub fn update_image_url(&mut self, id: &str, image_url: &str) -> Result<GenerationRecord> {
        self.modify(id, |record| {
            record.image_url = Some(image_url.to_string());
        })
    }

    /// Stores the instruction that produced the current image.
    pub fn record_refinement(
        &mut self,
        id: &str,
        refined_prompt: &str,
        image_url: &str,
    ) -> Result<GenerationRecord> {
        self.modify(id, |record| {
            record.refined_prompt = Some(refined_prompt.to_string());
            record.image_url = Some(image_url.to_string());
        })
    }

    pub fn delete(&mut self, id: &str) -> Result<bool> {
        if !self.records.contains_key(id) {
            return Ok(false);
        }
        self.append(&LogEntry::Delete { id: id.to_string() })?;
        self.records.shift_remove(id);
        Ok(true)
    }

    pub fn by_status(&self, status: JobStatus) -> Vec<&GenerationRecord> {
        self.records
            .values()
            .filter(|record| record.status == status)
            .collect()
    }

    /// All records, oldest first.
    pub fn list(&self) -> Vec<&GenerationRecord> {
        self.records.values().collect()
    }

    fn modify(
        &mut self,
        id: &str,
        apply: impl FnOnce(&mut GenerationRecord),
    ) -> Result<GenerationRecord> {
        let Some(mut record) = self.records.get(id).cloned() else {
            bail!("generation record {id} not found");
        };
        apply(&mut record);
        record.updated_at = now_utc_iso();
        self.put(record.clone())?;
        Ok(record)
    }

    fn put(&mut self, record: GenerationRecord) -> Result<()> {
        let entry = LogEntry::Put(record);
        self.append(&entry)?;
        if let LogEntry::Put(record) = entry {
            self.records.insert(record.id.clone(), record);
        }
        Ok(())
    }

    fn append(&self, entry: &LogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed opening {}", self.path.display()))?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }
}

fn replay(path: &Path) -> Result<IndexMap<String, GenerationRecord>> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(IndexMap::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed reading {}", path.display()));
        }
    };
    let mut records = IndexMap::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: LogEntry = serde_json::from_str(&line).with_context(|| {
            format!("malformed generation log line {} in {}", index + 1, path.display())
        })?;
        match entry {
            LogEntry::Put(record) => {
                records.insert(record.id.clone(), record);
            }
            LogEntry::Delete { id } => {
                records.shift_remove(&id);
            }
        }
    }
    Ok(records)
}
