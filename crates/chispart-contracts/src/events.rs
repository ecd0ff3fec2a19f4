use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::bail;
use chrono::{SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::queue::ItemId;
use crate::session::SessionSummary;

const IMAGE_PREVIEW_CHARS: usize = 96;

/// Everything the studio reports while it works, in the shape it is logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StudioEvent {
    JobQueued {
        job_id: ItemId,
        original_prompt: String,
        styled_prompt: String,
        style: String,
    },
    ItemQueued {
        item_id: ItemId,
        kind: &'static str,
        skipped_reason: Option<String>,
    },
    ItemRemoved {
        item_id: ItemId,
        kind: &'static str,
    },
    QueueCleared {
        removed: usize,
    },
    BatchStarted {
        job_ids: Vec<ItemId>,
        provider: String,
        model: String,
    },
    JobStarted {
        job_id: ItemId,
        styled_prompt: String,
    },
    JobCompleted {
        job_id: ItemId,
        #[serde(serialize_with = "image_preview")]
        image_url: String,
    },
    JobFailed {
        job_id: ItemId,
        error: String,
    },
    BatchFinished {
        completed: usize,
        failed: usize,
    },
    RefinementStarted {
        job_id: ItemId,
        instruction: String,
    },
    RefinementCompleted {
        job_id: ItemId,
        instruction: String,
        #[serde(serialize_with = "image_preview")]
        image_url: String,
    },
    RefinementFailed {
        job_id: ItemId,
        instruction: String,
        error: String,
    },
    ExportFinished {
        mode: &'static str,
        entries: usize,
        skipped: usize,
    },
    PromptsExtracted {
        count: usize,
        provider: String,
        model: String,
    },
}

/// Routing and output settings a session was opened with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStart {
    pub command: String,
    pub out_dir: String,
    pub image_provider: String,
    pub image_model: String,
    pub text_provider: String,
    pub text_model: String,
    pub style: String,
}

/// Session boundaries; everything in between is a [`StudioEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted(SessionStart),
    SessionFinished(SessionSummary),
}

// Inline images are logged as a short prefix; remote URLs are kept whole.
fn image_preview<S: Serializer>(url: &str, serializer: S) -> Result<S::Ok, S::Error> {
    if url.starts_with("data:") && url.chars().count() > IMAGE_PREVIEW_CHARS {
        let head: String = url.chars().take(IMAGE_PREVIEW_CHARS).collect();
        return serializer.serialize_str(&format!("{head}…"));
    }
    serializer.serialize_str(url)
}

/// Append-only writer for a session's `events.jsonl`.
///
/// - every line carries `session_id` and `ts`
/// - the event's own fields, `type` included, are written alongside
/// - one compact JSON object per line
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Appends one event. It must serialize to an object with a `type` tag.
    pub fn write<E: Serialize>(&self, event: &E) -> anyhow::Result<Value> {
        let Value::Object(fields) = serde_json::to_value(event)? else {
            bail!("events must serialize to a JSON object");
        };
        if !fields.contains_key("type") {
            bail!("event has no type tag");
        }
        let mut record = Map::new();
        record.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        record.insert("ts".to_string(), Value::String(now_utc_iso()));
        record.extend(fields);

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&record)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(record))
    }
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
