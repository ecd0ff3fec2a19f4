mod job;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

pub use job::{JobStatus, PromptJob};

use crate::config::QueueLimits;
use crate::media::is_valid_image_url;
use crate::styles::ArtStyle;

pub type ItemId = u64;

pub const INVALID_URL_REASON: &str = "not a valid image URL (expected .jpeg, .jpg, .gif, .png, .webp or a data:image URI)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueItem {
    TitleComment {
        id: ItemId,
        text: String,
    },
    ExternalImage {
        id: ItemId,
        image_url: String,
    },
    SkippedPrompt {
        id: ItemId,
        text: String,
        reason: String,
    },
    #[serde(rename = "prompt")]
    PromptJob(PromptJob),
}

impl QueueItem {
    pub fn id(&self) -> ItemId {
        match self {
            Self::TitleComment { id, .. }
            | Self::ExternalImage { id, .. }
            | Self::SkippedPrompt { id, .. } => *id,
            Self::PromptJob(job) => job.id(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::TitleComment { .. } => "title_comment",
            Self::ExternalImage { .. } => "external_image",
            Self::SkippedPrompt { .. } => "skipped_prompt",
            Self::PromptJob(_) => "prompt",
        }
    }

    pub fn as_job(&self) -> Option<&PromptJob> {
        match self {
            Self::PromptJob(job) => Some(job),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    Url,
    TitlePrompt,
    #[default]
    PromptOnly,
}

impl InputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::TitlePrompt => "title_prompt",
            Self::PromptOnly => "prompt_only",
        }
    }
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "url" => Ok(Self::Url),
            "title" | "title_prompt" => Ok(Self::TitlePrompt),
            "prompt" | "prompt_only" => Ok(Self::PromptOnly),
            other => Err(format!(
                "Unknown input mode '{other}' (expected url, title_prompt or prompt_only)."
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueInput {
    Url(String),
    TitlePrompt { title: String, prompt: String },
    PromptOnly(String),
}

impl QueueInput {
    pub fn mode(&self) -> InputMode {
        match self {
            Self::Url(_) => InputMode::Url,
            Self::TitlePrompt { .. } => InputMode::TitlePrompt,
            Self::PromptOnly(_) => InputMode::PromptOnly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InsertOutcome {
    pub ids: Vec<ItemId>,
    pub job_id: Option<ItemId>,
    /// Set when the input was stored as a `SkippedPrompt`.
    pub skipped_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Nothing to add: the input is empty.")]
    EmptyInput,
    #[error("The queue is full ({limit} items maximum).")]
    QueueFull { limit: usize },
    #[error("The AI job limit has been reached ({limit} jobs maximum).")]
    JobLimitReached { limit: usize },
    #[error("No queue item with id {0}.")]
    UnknownItem(ItemId),
    #[error("Queue item {0} is not an AI job.")]
    NotAJob(ItemId),
    #[error("Job {0} has no generated image.")]
    NoImage(ItemId),
    #[error("Job {id} cannot move from {from} to {to}.")]
    InvalidTransition {
        id: ItemId,
        from: JobStatus,
        to: JobStatus,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub refining: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed + self.refining
    }
}

/// Ordered queue of display items. The AI job view is derived from the same
/// list, so both views always reflect the same job state.
#[derive(Debug, Clone)]
pub struct Queue {
    items: Vec<QueueItem>,
    next_id: ItemId,
    limits: QueueLimits,
}

impl Queue {
    pub fn new(limits: QueueLimits) -> Self {
        Self {
            items: Vec::new(),
            next_id: 1,
            limits,
        }
    }

    pub fn limits(&self) -> QueueLimits {
        self.limits
    }

    pub fn items(&self) -> &[QueueItem] {
        self.items.as_slice()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &PromptJob> {
        self.items.iter().filter_map(QueueItem::as_job)
    }

    pub fn job_count(&self) -> usize {
        self.jobs().count()
    }

    pub fn job(&self, id: ItemId) -> Option<&PromptJob> {
        self.jobs().find(|job| job.id() == id)
    }

    pub fn get(&self, id: ItemId) -> Option<&QueueItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn pending_ids(&self) -> Vec<ItemId> {
        self.jobs()
            .filter(|job| job.status() == JobStatus::Pending)
            .map(PromptJob::id)
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.jobs()
            .filter(|job| job.status() == JobStatus::Pending)
            .count()
    }

    /// Completed jobs that hold an image, in insertion order.
    pub fn completed_images(&self) -> Vec<&PromptJob> {
        self.jobs().filter(|job| job.has_image()).collect()
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for job in self.jobs() {
            match job.status() {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Refining => counts.refining += 1,
            }
        }
        counts
    }

    pub fn can_accept_job(&self) -> bool {
        self.check_capacity(1, 1).is_ok()
    }

    /// Classifies raw input into queue items. Either every resulting item is
    /// stored or, on error, the queue is left untouched.
    pub fn classify_and_insert(
        &mut self,
        input: QueueInput,
        style: &ArtStyle,
    ) -> Result<InsertOutcome, QueueError> {
        match input {
            QueueInput::Url(raw) => {
                let url = raw.trim();
                if url.is_empty() {
                    return Err(QueueError::EmptyInput);
                }
                self.check_capacity(1, 0)?;
                let id = self.allocate_id();
                if is_valid_image_url(url) {
                    self.items.push(QueueItem::ExternalImage {
                        id,
                        image_url: url.to_string(),
                    });
                    return Ok(InsertOutcome {
                        ids: vec![id],
                        ..InsertOutcome::default()
                    });
                }
                self.items.push(QueueItem::SkippedPrompt {
                    id,
                    text: url.to_string(),
                    reason: INVALID_URL_REASON.to_string(),
                });
                Ok(InsertOutcome {
                    ids: vec![id],
                    job_id: None,
                    skipped_reason: Some(INVALID_URL_REASON.to_string()),
                })
            }
            QueueInput::TitlePrompt { title, prompt } => {
                let title = title.trim();
                let prompt = prompt.trim();
                if title.is_empty() && prompt.is_empty() {
                    return Err(QueueError::EmptyInput);
                }
                let new_items = usize::from(!title.is_empty()) + usize::from(!prompt.is_empty());
                let new_jobs = usize::from(!prompt.is_empty());
                self.check_capacity(new_items, new_jobs)?;

                let mut outcome = InsertOutcome::default();
                if !title.is_empty() {
                    let id = self.allocate_id();
                    self.items.push(QueueItem::TitleComment {
                        id,
                        text: title.to_string(),
                    });
                    outcome.ids.push(id);
                }
                if !prompt.is_empty() {
                    let id = self.push_job(prompt, style);
                    outcome.ids.push(id);
                    outcome.job_id = Some(id);
                }
                Ok(outcome)
            }
            QueueInput::PromptOnly(raw) => {
                let prompt = raw.trim();
                if prompt.is_empty() {
                    return Err(QueueError::EmptyInput);
                }
                self.check_capacity(1, 1)?;
                let id = self.push_job(prompt, style);
                Ok(InsertOutcome {
                    ids: vec![id],
                    job_id: Some(id),
                    skipped_reason: None,
                })
            }
        }
    }

    pub fn remove_item(&mut self, id: ItemId) -> Result<QueueItem, QueueError> {
        let Some(index) = self.items.iter().position(|item| item.id() == id) else {
            return Err(QueueError::UnknownItem(id));
        };
        Ok(self.items.remove(index))
    }

    /// Empties the queue. Ids keep increasing afterwards.
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        removed
    }

    /// `pending -> processing`; returns the styled prompt to send.
    pub fn begin_processing(&mut self, id: ItemId) -> Result<String, QueueError> {
        let job = self.job_mut(id)?;
        job.start_processing()?;
        Ok(job.styled_prompt().to_string())
    }

    pub fn complete_generation(&mut self, id: ItemId, image_url: String) -> Result<(), QueueError> {
        self.job_mut(id)?.finish_generation(image_url)
    }

    pub fn fail_generation(&mut self, id: ItemId, error: String) -> Result<(), QueueError> {
        self.job_mut(id)?.fail_generation(error)
    }

    /// `completed -> refining`; returns the image the refinement starts from.
    pub fn begin_refinement(&mut self, id: ItemId) -> Result<String, QueueError> {
        self.job_mut(id)?.start_refinement()
    }

    pub fn complete_refinement(&mut self, id: ItemId, image_url: String) -> Result<(), QueueError> {
        self.job_mut(id)?.finish_refinement(image_url)
    }

    pub fn fail_refinement(&mut self, id: ItemId, error: String) -> Result<(), QueueError> {
        self.job_mut(id)?.fail_refinement(error)
    }

    fn job_mut(&mut self, id: ItemId) -> Result<&mut PromptJob, QueueError> {
        let Some(item) = self.items.iter_mut().find(|item| item.id() == id) else {
            return Err(QueueError::UnknownItem(id));
        };
        match item {
            QueueItem::PromptJob(job) => Ok(job),
            _ => Err(QueueError::NotAJob(id)),
        }
    }

    fn check_capacity(&self, new_items: usize, new_jobs: usize) -> Result<(), QueueError> {
        if self.items.len() + new_items > self.limits.max_items {
            return Err(QueueError::QueueFull {
                limit: self.limits.max_items,
            });
        }
        if new_jobs > 0 && self.job_count() + new_jobs > self.limits.max_jobs {
            return Err(QueueError::JobLimitReached {
                limit: self.limits.max_jobs,
            });
        }
        Ok(())
    }

    fn push_job(&mut self, prompt: &str, style: &ArtStyle) -> ItemId {
        let id = self.allocate_id();
        self.items
            .push(QueueItem::PromptJob(PromptJob::new(id, prompt, style)));
        id
    }

    fn allocate_id(&mut self) -> ItemId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new(QueueLimits::default())
    }
}
