use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use chispart_contracts::events::{now_utc_iso, EventWriter, SessionEvent, SessionStart};
use chispart_contracts::queue::{ItemId, JobStatus, StatusCounts};
use chispart_contracts::session::{write_summary, SessionSummary};
use chispart_contracts::store::{GenerationStore, NewGeneration};
use parking_lot::Mutex;

pub use chispart_contracts::events::StudioEvent;

/// Receives studio events after the queue lock has been released.
pub trait StudioObserver: Send + Sync {
    fn on_event(&self, event: &StudioEvent);
}

#[derive(Debug, Default)]
struct SessionCounters {
    batches: u64,
    refinements: u64,
    refinements_failed: u64,
    exports: u64,
}

/// Mirrors studio events into `events.jsonl` and keeps the counters needed
/// for `summary.json`.
pub struct EventLogObserver {
    writer: EventWriter,
    started_at: String,
    counters: Mutex<SessionCounters>,
}

impl EventLogObserver {
    pub fn new(writer: EventWriter) -> Self {
        Self {
            writer,
            started_at: now_utc_iso(),
            counters: Mutex::new(SessionCounters::default()),
        }
    }

    pub fn writer(&self) -> &EventWriter {
        &self.writer
    }

    pub fn session_started(&self, start: SessionStart) -> Result<()> {
        self.writer.write(&SessionEvent::SessionStarted(start))?;
        Ok(())
    }

    /// Emits `session_finished` and writes the summary file.
    pub fn finish(&self, counts: StatusCounts, summary_path: &Path) -> Result<SessionSummary> {
        let summary = {
            let counters = self.counters.lock();
            SessionSummary {
                session_id: self.writer.session_id().to_string(),
                started_at: self.started_at.clone(),
                finished_at: now_utc_iso(),
                jobs_total: counts.total() as u64,
                jobs_completed: counts.completed as u64,
                jobs_failed: counts.failed as u64,
                jobs_pending: counts.pending as u64,
                batches: counters.batches,
                refinements: counters.refinements,
                refinements_failed: counters.refinements_failed,
                exports: counters.exports,
            }
        };
        self.writer
            .write(&SessionEvent::SessionFinished(summary.clone()))?;
        write_summary(summary_path, &summary)?;
        Ok(summary)
    }
}

impl StudioObserver for EventLogObserver {
    fn on_event(&self, event: &StudioEvent) {
        {
            let mut counters = self.counters.lock();
            match event {
                StudioEvent::BatchFinished { .. } => counters.batches += 1,
                StudioEvent::RefinementCompleted { .. } => counters.refinements += 1,
                StudioEvent::RefinementFailed { .. } => {
                    counters.refinements += 1;
                    counters.refinements_failed += 1;
                }
                StudioEvent::ExportFinished { .. } => counters.exports += 1,
                _ => {}
            }
        }
        if let Err(err) = self.writer.write(event) {
            tracing::warn!("failed to append studio event: {err:#}");
        }
    }
}

struct StoreState {
    store: GenerationStore,
    records: HashMap<ItemId, String>,
}

/// Persists generation records as jobs move through the studio.
pub struct StoreObserver {
    state: Mutex<StoreState>,
}

impl StoreObserver {
    pub fn new(store: GenerationStore) -> Self {
        Self {
            state: Mutex::new(StoreState {
                store,
                records: HashMap::new(),
            }),
        }
    }

    pub fn record_id(&self, job_id: ItemId) -> Option<String> {
        self.state.lock().records.get(&job_id).cloned()
    }

    fn apply(&self, event: &StudioEvent) -> Result<()> {
        let mut state = self.state.lock();
        let StoreState { store, records } = &mut *state;
        match event {
            StudioEvent::JobQueued {
                job_id,
                original_prompt,
                styled_prompt,
                style,
            } => {
                let record = store.create(NewGeneration {
                    job_id: Some(*job_id),
                    prompt: original_prompt.clone(),
                    styled_prompt: styled_prompt.clone(),
                    artistic_style: Some(style.clone()),
                })?;
                records.insert(*job_id, record.id);
            }
            // The route is only known once a batch picks the jobs up.
            StudioEvent::BatchStarted {
                job_ids,
                provider,
                model,
            } => {
                for job_id in job_ids {
                    if let Some(id) = records.get(job_id) {
                        store.assign_route(id, provider, model)?;
                    }
                }
            }
            StudioEvent::JobStarted { job_id, .. } => {
                if let Some(id) = records.get(job_id) {
                    store.update_status(id, JobStatus::Processing, None)?;
                }
            }
            StudioEvent::JobCompleted { job_id, image_url } => {
                if let Some(id) = records.get(job_id) {
                    store.update_image_url(id, image_url)?;
                    store.update_status(id, JobStatus::Completed, None)?;
                }
            }
            StudioEvent::JobFailed { job_id, error } => {
                if let Some(id) = records.get(job_id) {
                    store.update_status(id, JobStatus::Failed, Some(error.clone()))?;
                }
            }
            StudioEvent::RefinementStarted { job_id, .. } => {
                if let Some(id) = records.get(job_id) {
                    store.update_status(id, JobStatus::Refining, None)?;
                }
            }
            StudioEvent::RefinementCompleted {
                job_id,
                instruction,
                image_url,
            } => {
                if let Some(id) = records.get(job_id) {
                    store.record_refinement(id, instruction, image_url)?;
                    store.update_status(id, JobStatus::Completed, None)?;
                }
            }
            StudioEvent::RefinementFailed { job_id, error, .. } => {
                if let Some(id) = records.get(job_id) {
                    store.update_status(id, JobStatus::Completed, Some(error.clone()))?;
                }
            }
            // Records outlive their queue items; only the lookup is dropped.
            StudioEvent::ItemRemoved { item_id, .. } => {
                records.remove(item_id);
            }
            StudioEvent::QueueCleared { .. } => records.clear(),
            _ => {}
        }
        Ok(())
    }
}

impl StudioObserver for StoreObserver {
    fn on_event(&self, event: &StudioEvent) {
        if let Err(err) = self.apply(event) {
            tracing::warn!("generation store update failed: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use chispart_contracts::events::{EventWriter, SessionStart};
    use chispart_contracts::queue::{JobStatus, StatusCounts};
    use chispart_contracts::store::GenerationStore;
    use serde_json::{json, Value};

    use super::{EventLogObserver, StoreObserver, StudioEvent, StudioObserver};

    fn queued(job_id: u64) -> StudioEvent {
        StudioEvent::JobQueued {
            job_id,
            original_prompt: "a lighthouse".to_string(),
            styled_prompt: "a lighthouse, cyberpunk style".to_string(),
            style: "Cyberpunk".to_string(),
        }
    }

    #[test]
    fn event_log_writes_lines_and_summary() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let observer = EventLogObserver::new(EventWriter::new(&events_path, "session-1"));

        observer.session_started(SessionStart {
            command: "run".to_string(),
            ..SessionStart::default()
        })?;
        observer.on_event(&queued(1));
        observer.on_event(&StudioEvent::JobCompleted {
            job_id: 1,
            image_url: format!("data:image/png;base64,{}", "A".repeat(400)),
        });
        observer.on_event(&StudioEvent::BatchFinished {
            completed: 1,
            failed: 0,
        });
        observer.on_event(&StudioEvent::RefinementFailed {
            job_id: 1,
            instruction: "night".to_string(),
            error: "Error refining image: boom".to_string(),
        });

        let counts = StatusCounts {
            completed: 1,
            ..StatusCounts::default()
        };
        let summary = observer.finish(counts, &temp.path().join("summary.json"))?;
        assert_eq!(summary.batches, 1);
        assert_eq!(summary.refinements, 1);
        assert_eq!(summary.refinements_failed, 1);
        assert_eq!(summary.jobs_total, 1);

        let content = std::fs::read_to_string(&events_path)?;
        let lines: Vec<Value> = content
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        let types: Vec<&str> = lines
            .iter()
            .filter_map(|line| line["type"].as_str())
            .collect();
        assert_eq!(
            types,
            vec![
                "session_started",
                "job_queued",
                "job_completed",
                "batch_finished",
                "refinement_failed",
                "session_finished"
            ]
        );
        let preview = lines[2]["image_url"].as_str().unwrap_or("");
        assert!(preview.len() < 200);
        assert_eq!(lines[0]["command"], json!("run"));
        assert_eq!(lines[1]["styled_prompt"], json!("a lighthouse, cyberpunk style"));
        assert!(lines[1].get("provider").is_none());
        Ok(())
    }

    #[test]
    fn store_observer_tracks_job_lifecycle() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("generations.jsonl");
        let observer = StoreObserver::new(GenerationStore::open(&path)?);

        observer.on_event(&queued(7));
        observer.on_event(&queued(8));
        observer.on_event(&StudioEvent::BatchStarted {
            job_ids: vec![7],
            provider: "dryrun".to_string(),
            model: "dryrun-image-1".to_string(),
        });
        observer.on_event(&StudioEvent::JobStarted {
            job_id: 7,
            styled_prompt: "a lighthouse, cyberpunk style".to_string(),
        });
        observer.on_event(&StudioEvent::JobCompleted {
            job_id: 7,
            image_url: "data:image/png;base64,AAA".to_string(),
        });
        observer.on_event(&StudioEvent::RefinementCompleted {
            job_id: 7,
            instruction: "make it night".to_string(),
            image_url: "data:image/png;base64,BBB".to_string(),
        });

        let record_id = observer
            .record_id(7)
            .ok_or_else(|| anyhow::anyhow!("missing record"))?;
        let waiting_id = observer
            .record_id(8)
            .ok_or_else(|| anyhow::anyhow!("missing record"))?;
        let store = GenerationStore::open(&path)?;
        let record = store
            .find_by_id(&record_id)
            .ok_or_else(|| anyhow::anyhow!("record not persisted"))?;
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.image_url.as_deref(), Some("data:image/png;base64,BBB"));
        assert_eq!(record.refined_prompt.as_deref(), Some("make it night"));
        assert_eq!(record.provider, "dryrun");
        assert_eq!(record.model, "dryrun-image-1");

        let waiting = store
            .find_by_id(&waiting_id)
            .ok_or_else(|| anyhow::anyhow!("record not persisted"))?;
        assert_eq!(waiting.status, JobStatus::Pending);
        assert_eq!(waiting.provider, "");

        observer.on_event(&StudioEvent::ItemRemoved {
            item_id: 7,
            kind: "prompt",
        });
        assert!(observer.record_id(7).is_none());
        assert_eq!(GenerationStore::open(&path)?.list().len(), 2);
        Ok(())
    }
}
