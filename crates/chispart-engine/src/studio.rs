use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chispart_contracts::config::{QueueLimits, StudioConfig};
use chispart_contracts::providers::Capability;
use chispart_contracts::queue::{
    InsertOutcome, ItemId, Queue, QueueError, QueueInput, QueueItem, StatusCounts,
};
use chispart_contracts::styles::{ArtStyle, StyleCatalog};
use parking_lot::Mutex;
use thiserror::Error;

use crate::adapter::{ProviderAdapter, ProviderError, ProviderRoute};
use crate::export::{ExportEntry, ExportMode, ExportReport, Exporter};
use crate::http::error_chain_text;
use crate::observers::{StudioEvent, StudioObserver};

/// What the studio is doing right now. Batch, refinement and export are
/// mutually exclusive across the whole queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Batch,
    Refining,
    Exporting,
}

impl Activity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Batch => "batch running",
            Self::Refining => "refinement in progress",
            Self::Exporting => "export in progress",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StudioError {
    #[error("The studio is busy ({0}); wait for it to finish.")]
    Busy(Activity),
    #[error("There are no pending prompts to generate.")]
    NothingToGenerate,
    #[error("There are no generated images to export.")]
    NothingToExport,
    #[error("The refinement instruction is empty.")]
    EmptyInstruction,
    #[error("Unknown art style '{0}'.")]
    UnknownStyle(String),
    #[error("Provider {provider} does not support {}", .capability.label())]
    UnsupportedRoute {
        provider: String,
        capability: Capability,
    },
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Export failed: {0}")]
    Export(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub job_id: ItemId,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchReport {
    /// Jobs in the order they were sent.
    pub job_ids: Vec<ItemId>,
    pub completed: Vec<ItemId>,
    pub failed: Vec<JobFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefinementOutcome {
    Refined { image_url: String },
    /// The job keeps its previous image.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulkInsertReport {
    pub queued: Vec<ItemId>,
    pub not_queued: Vec<String>,
    pub rejection: Option<QueueError>,
}

#[derive(Debug, Clone)]
pub struct StudioSnapshot {
    pub items: Vec<QueueItem>,
    pub counts: StatusCounts,
    pub limits: QueueLimits,
    pub activity: Activity,
    pub style: ArtStyle,
    pub image_route: ProviderRoute,
    pub text_route: ProviderRoute,
    pub extracted: Vec<String>,
}

struct StudioState {
    queue: Queue,
    activity: Activity,
    style: ArtStyle,
    image_route: ProviderRoute,
    text_route: ProviderRoute,
    extracted: Vec<String>,
}

impl StudioState {
    fn ensure_idle(&self) -> Result<(), StudioError> {
        match self.activity {
            Activity::Idle => Ok(()),
            busy => Err(StudioError::Busy(busy)),
        }
    }

    fn queued_events(&self, outcome: &InsertOutcome) -> Vec<StudioEvent> {
        outcome
            .ids
            .iter()
            .filter_map(|id| self.queue.get(*id))
            .map(|item| match item {
                QueueItem::PromptJob(job) => StudioEvent::JobQueued {
                    job_id: job.id(),
                    original_prompt: job.original_prompt().to_string(),
                    styled_prompt: job.styled_prompt().to_string(),
                    style: job.art_style_used().to_string(),
                },
                other => StudioEvent::ItemQueued {
                    item_id: other.id(),
                    kind: other.kind(),
                    skipped_reason: outcome.skipped_reason.clone(),
                },
            })
            .collect()
    }
}

struct StudioInner {
    state: Mutex<StudioState>,
    adapter: Arc<ProviderAdapter>,
    styles: StyleCatalog,
    exporter: Exporter,
    generation_delay: Duration,
    max_extracted_prompts: usize,
    observers: Vec<Arc<dyn StudioObserver>>,
}

/// Resets the activity flag when a batch, refinement or export ends, even if
/// a provider call panics.
struct ActivityGuard<'a> {
    state: &'a Mutex<StudioState>,
}

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().activity = Activity::Idle;
    }
}

/// Owns the queue and drives batches, refinements and exports through the
/// provider adapter. The queue lock is never held across a provider call.
#[derive(Clone)]
pub struct Studio {
    inner: Arc<StudioInner>,
}

impl Studio {
    pub fn new(
        config: &StudioConfig,
        adapter: Arc<ProviderAdapter>,
        observers: Vec<Arc<dyn StudioObserver>>,
    ) -> Self {
        let styles = config.style_catalog();
        let style = styles.resolve(&config.default_style);
        let state = StudioState {
            queue: Queue::new(config.limits()),
            activity: Activity::Idle,
            style,
            image_route: ProviderRoute::new(&config.image_provider, &config.image_model),
            text_route: ProviderRoute::new(&config.text_provider, &config.text_model),
            extracted: Vec::new(),
        };
        Self {
            inner: Arc::new(StudioInner {
                state: Mutex::new(state),
                adapter,
                styles,
                exporter: Exporter::new(config.download_delay()),
                generation_delay: config.generation_delay(),
                max_extracted_prompts: config.max_extracted_prompts,
                observers,
            }),
        }
    }

    pub fn styles(&self) -> &StyleCatalog {
        &self.inner.styles
    }

    pub fn adapter(&self) -> &ProviderAdapter {
        &self.inner.adapter
    }

    pub fn activity(&self) -> Activity {
        self.inner.state.lock().activity
    }

    pub fn snapshot(&self) -> StudioSnapshot {
        let state = self.inner.state.lock();
        StudioSnapshot {
            items: state.queue.items().to_vec(),
            counts: state.queue.status_counts(),
            limits: state.queue.limits(),
            activity: state.activity,
            style: state.style.clone(),
            image_route: state.image_route.clone(),
            text_route: state.text_route.clone(),
            extracted: state.extracted.clone(),
        }
    }

    pub fn set_style(&self, value: &str) -> Result<ArtStyle, StudioError> {
        let Some(style) = self.inner.styles.get(value).cloned() else {
            return Err(StudioError::UnknownStyle(value.trim().to_string()));
        };
        self.inner.state.lock().style = style.clone();
        Ok(style)
    }

    /// Points image work (generation and refinement) or text work at another
    /// provider. An empty model means the provider default.
    pub fn set_route(&self, capability: Capability, route: ProviderRoute) -> Result<(), StudioError> {
        if !self.inner.adapter.supports(&route.provider, capability) {
            return Err(StudioError::UnsupportedRoute {
                provider: route.provider,
                capability,
            });
        }
        let mut state = self.inner.state.lock();
        match capability {
            Capability::TextGeneration => state.text_route = route,
            Capability::ImageGeneration | Capability::ImageRefinement => {
                state.image_route = route
            }
        }
        Ok(())
    }

    /// Changes only the model of an existing route.
    pub fn set_model(&self, capability: Capability, model: &str) -> Result<(), StudioError> {
        let provider = {
            let state = self.inner.state.lock();
            match capability {
                Capability::TextGeneration => state.text_route.provider.clone(),
                _ => state.image_route.provider.clone(),
            }
        };
        self.set_route(capability, ProviderRoute::new(provider, model))
    }

    pub fn insert(&self, input: QueueInput) -> Result<InsertOutcome, StudioError> {
        let (outcome, events) = {
            let mut state = self.inner.state.lock();
            state.ensure_idle()?;
            let style = state.style.clone();
            let outcome = state.queue.classify_and_insert(input, &style)?;
            let events = state.queued_events(&outcome);
            (outcome, events)
        };
        self.notify_all(&events);
        Ok(outcome)
    }

    /// Queues prompts one by one with the current style, stopping at the first
    /// capacity rejection. Blank prompts are ignored.
    pub fn queue_prompts(&self, prompts: &[String]) -> Result<BulkInsertReport, StudioError> {
        let (report, events) = {
            let mut state = self.inner.state.lock();
            state.ensure_idle()?;
            let style = state.style.clone();
            let mut report = BulkInsertReport::default();
            let mut events = Vec::new();
            for (index, prompt) in prompts.iter().enumerate() {
                match state
                    .queue
                    .classify_and_insert(QueueInput::PromptOnly(prompt.clone()), &style)
                {
                    Ok(outcome) => {
                        events.extend(state.queued_events(&outcome));
                        report.queued.extend(outcome.job_id);
                    }
                    Err(QueueError::EmptyInput) => {}
                    Err(err) => {
                        report.not_queued = prompts[index..].to_vec();
                        report.rejection = Some(err);
                        break;
                    }
                }
            }
            (report, events)
        };
        self.notify_all(&events);
        Ok(report)
    }

    /// Queues the prompts from the last extraction and forgets them.
    pub fn accept_extracted(&self) -> Result<BulkInsertReport, StudioError> {
        let prompts = std::mem::take(&mut self.inner.state.lock().extracted);
        match self.queue_prompts(&prompts) {
            Ok(report) => Ok(report),
            Err(err) => {
                self.inner.state.lock().extracted = prompts;
                Err(err)
            }
        }
    }

    pub fn remove(&self, id: ItemId) -> Result<QueueItem, StudioError> {
        let removed = {
            let mut state = self.inner.state.lock();
            state.ensure_idle()?;
            state.queue.remove_item(id)?
        };
        self.notify(&StudioEvent::ItemRemoved {
            item_id: id,
            kind: removed.kind(),
        });
        Ok(removed)
    }

    pub fn clear(&self) -> Result<usize, StudioError> {
        let removed = {
            let mut state = self.inner.state.lock();
            state.ensure_idle()?;
            state.queue.clear()
        };
        self.notify(&StudioEvent::QueueCleared { removed });
        Ok(removed)
    }

    /// Generates every job that is pending when the batch starts, in queue
    /// order and one at a time. A failed job never stops the batch.
    pub fn run_batch(&self) -> Result<BatchReport, StudioError> {
        let (job_ids, route) = {
            let mut state = self.inner.state.lock();
            state.ensure_idle()?;
            let job_ids = state.queue.pending_ids();
            if job_ids.is_empty() {
                return Err(StudioError::NothingToGenerate);
            }
            state.activity = Activity::Batch;
            (job_ids, state.image_route.clone())
        };
        let _guard = ActivityGuard {
            state: &self.inner.state,
        };

        tracing::info!(
            jobs = job_ids.len(),
            provider = %route.provider,
            model = %route.model,
            "batch started"
        );
        self.notify(&StudioEvent::BatchStarted {
            job_ids: job_ids.clone(),
            provider: route.provider.clone(),
            model: route.model.clone(),
        });

        let mut report = BatchReport::default();
        for (position, job_id) in job_ids.iter().copied().enumerate() {
            if position > 0 && !self.inner.generation_delay.is_zero() {
                thread::sleep(self.inner.generation_delay);
            }
            let started = self.inner.state.lock().queue.begin_processing(job_id);
            let styled_prompt = match started {
                Ok(prompt) => prompt,
                Err(err) => {
                    tracing::warn!(job_id, "skipping job: {err}");
                    continue;
                }
            };
            report.job_ids.push(job_id);
            self.notify(&StudioEvent::JobStarted {
                job_id,
                styled_prompt: styled_prompt.clone(),
            });

            match self.inner.adapter.generate_image(&styled_prompt, &route) {
                Ok(image_url) => {
                    let applied = self
                        .inner
                        .state
                        .lock()
                        .queue
                        .complete_generation(job_id, image_url.clone());
                    if let Err(err) = applied {
                        tracing::warn!(job_id, "could not record generated image: {err}");
                        continue;
                    }
                    report.completed.push(job_id);
                    self.notify(&StudioEvent::JobCompleted { job_id, image_url });
                }
                Err(err) => {
                    tracing::warn!(job_id, provider = %err.provider, "generation failed: {err}");
                    let applied = self
                        .inner
                        .state
                        .lock()
                        .queue
                        .fail_generation(job_id, err.message.clone());
                    if let Err(err) = applied {
                        tracing::warn!(job_id, "could not record generation failure: {err}");
                        continue;
                    }
                    report.failed.push(JobFailure {
                        job_id,
                        error: err.message.clone(),
                    });
                    self.notify(&StudioEvent::JobFailed {
                        job_id,
                        error: err.message,
                    });
                }
            }
        }

        tracing::info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            "batch finished"
        );
        self.notify(&StudioEvent::BatchFinished {
            completed: report.completed.len(),
            failed: report.failed.len(),
        });
        Ok(report)
    }

    /// Applies an instruction to a completed job's image. A provider failure
    /// is reported in the outcome and leaves the job completed with its
    /// previous image.
    pub fn refine(&self, job_id: ItemId, instruction: &str) -> Result<RefinementOutcome, StudioError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(StudioError::EmptyInstruction);
        }
        let (source, route) = {
            let mut state = self.inner.state.lock();
            state.ensure_idle()?;
            let source = state.queue.begin_refinement(job_id)?;
            state.activity = Activity::Refining;
            (source, state.image_route.clone())
        };
        let _guard = ActivityGuard {
            state: &self.inner.state,
        };
        self.notify(&StudioEvent::RefinementStarted {
            job_id,
            instruction: instruction.to_string(),
        });

        match self.inner.adapter.refine_image(&source, instruction, &route) {
            Ok(image_url) => {
                self.inner
                    .state
                    .lock()
                    .queue
                    .complete_refinement(job_id, image_url.clone())?;
                self.notify(&StudioEvent::RefinementCompleted {
                    job_id,
                    instruction: instruction.to_string(),
                    image_url: image_url.clone(),
                });
                Ok(RefinementOutcome::Refined { image_url })
            }
            Err(err) => {
                tracing::warn!(job_id, provider = %err.provider, "refinement failed: {err}");
                self.inner
                    .state
                    .lock()
                    .queue
                    .fail_refinement(job_id, err.message.clone())?;
                self.notify(&StudioEvent::RefinementFailed {
                    job_id,
                    instruction: instruction.to_string(),
                    error: err.message.clone(),
                });
                Ok(RefinementOutcome::Failed { error: err.message })
            }
        }
    }

    /// Writes every completed image into `out_dir`, as files or one archive.
    pub fn export(&self, mode: ExportMode, out_dir: &Path) -> Result<ExportReport, StudioError> {
        let entries = {
            let mut state = self.inner.state.lock();
            state.ensure_idle()?;
            let entries: Vec<ExportEntry> = state
                .queue
                .completed_images()
                .into_iter()
                .filter_map(ExportEntry::from_job)
                .collect();
            if entries.is_empty() {
                return Err(StudioError::NothingToExport);
            }
            state.activity = Activity::Exporting;
            entries
        };
        let _guard = ActivityGuard {
            state: &self.inner.state,
        };

        let report = self
            .inner
            .exporter
            .export(&entries, mode, out_dir)
            .map_err(|err| StudioError::Export(error_chain_text(&err, 600)))?;
        tracing::info!(
            mode = mode.as_str(),
            entries = report.entries.len(),
            skipped = report.skipped.len(),
            "export finished"
        );
        self.notify(&StudioEvent::ExportFinished {
            mode: mode.as_str(),
            entries: report.entries.len(),
            skipped: report.skipped.len(),
        });
        Ok(report)
    }

    /// Asks the text route for prompts. The result is kept for
    /// `accept_extracted` and does not touch the queue.
    pub fn extract_prompts(&self, text_block: &str) -> Result<Vec<String>, StudioError> {
        let route = self.inner.state.lock().text_route.clone();
        let prompts =
            self.inner
                .adapter
                .extract_prompts(text_block, &route, self.inner.max_extracted_prompts)?;
        self.inner.state.lock().extracted = prompts.clone();
        self.notify(&StudioEvent::PromptsExtracted {
            count: prompts.len(),
            provider: route.provider,
            model: route.model,
        });
        Ok(prompts)
    }

    fn notify(&self, event: &StudioEvent) {
        for observer in &self.inner.observers {
            observer.on_event(event);
        }
    }

    fn notify_all(&self, events: &[StudioEvent]) {
        for event in events {
            self.notify(event);
        }
    }
}
