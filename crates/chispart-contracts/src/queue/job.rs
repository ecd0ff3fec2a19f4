use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ItemId, QueueError};
use crate::styles::ArtStyle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refining,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refining => "refining",
        }
    }

    /// A provider call is outstanding for the job.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Processing | Self::Refining)
    }

    fn can_move_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
                | (Self::Completed, Self::Refining)
                | (Self::Refining, Self::Completed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An AI generation job. `styled_prompt` is fixed at creation and has no setter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptJob {
    id: ItemId,
    original_prompt: String,
    styled_prompt: String,
    status: JobStatus,
    image_url: Option<String>,
    error: Option<String>,
    refinement_error: Option<String>,
    art_style_used: String,
}

impl PromptJob {
    pub(crate) fn new(id: ItemId, original_prompt: &str, style: &ArtStyle) -> Self {
        Self {
            id,
            original_prompt: original_prompt.to_string(),
            styled_prompt: style.apply(original_prompt),
            status: JobStatus::Pending,
            image_url: None,
            error: None,
            refinement_error: None,
            art_style_used: style.name.clone(),
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn original_prompt(&self) -> &str {
        &self.original_prompt
    }

    pub fn styled_prompt(&self) -> &str {
        &self.styled_prompt
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    /// Generation failure message; only set when the job is `failed`.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Message from the most recent failed refinement, cleared by the next success.
    pub fn refinement_error(&self) -> Option<&str> {
        self.refinement_error.as_deref()
    }

    pub fn art_style_used(&self) -> &str {
        &self.art_style_used
    }

    pub fn has_image(&self) -> bool {
        self.status == JobStatus::Completed && self.image_url.is_some()
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), QueueError> {
        if !self.status.can_move_to(next) {
            return Err(QueueError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub(crate) fn start_processing(&mut self) -> Result<(), QueueError> {
        self.transition(JobStatus::Processing)
    }

    pub(crate) fn finish_generation(&mut self, image_url: String) -> Result<(), QueueError> {
        self.transition(JobStatus::Completed)?;
        self.image_url = Some(image_url);
        self.error = None;
        Ok(())
    }

    pub(crate) fn fail_generation(&mut self, error: String) -> Result<(), QueueError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error);
        Ok(())
    }

    pub(crate) fn start_refinement(&mut self) -> Result<String, QueueError> {
        let Some(image_url) = self.image_url.clone() else {
            return Err(QueueError::NoImage(self.id));
        };
        self.transition(JobStatus::Refining)?;
        Ok(image_url)
    }

    pub(crate) fn finish_refinement(&mut self, image_url: String) -> Result<(), QueueError> {
        self.transition(JobStatus::Completed)?;
        self.image_url = Some(image_url);
        self.refinement_error = None;
        Ok(())
    }

    pub(crate) fn fail_refinement(&mut self, error: String) -> Result<(), QueueError> {
        self.transition(JobStatus::Completed)?;
        self.refinement_error = Some(error);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{JobStatus, PromptJob};
    use crate::queue::QueueError;
    use crate::styles::ArtStyle;

    fn style() -> ArtStyle {
        ArtStyle::new("Cyberpunk", "cyberpunk", ", cyberpunk style")
    }

    #[test]
    fn new_job_is_pending_with_styled_prompt() {
        let job = PromptJob::new(7, "a lighthouse", &style());
        assert_eq!(job.id(), 7);
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.styled_prompt(), "a lighthouse, cyberpunk style");
        assert_eq!(job.art_style_used(), "Cyberpunk");
        assert!(job.image_url().is_none());
    }

    #[test]
    fn refinement_cannot_start_before_generation() {
        let mut job = PromptJob::new(1, "boat", &style());
        assert_eq!(job.start_refinement(), Err(QueueError::NoImage(1)));
        job.start_processing().unwrap_or_default();
        assert_eq!(job.start_refinement(), Err(QueueError::NoImage(1)));
    }

    #[test]
    fn status_only_moves_through_the_transition_table() {
        let mut job = PromptJob::new(4, "boat", &style());
        assert_eq!(
            job.finish_generation("data:image/png;base64,AAA".to_string()),
            Err(QueueError::InvalidTransition {
                id: 4,
                from: JobStatus::Pending,
                to: JobStatus::Completed,
            })
        );
        assert_eq!(job.status(), JobStatus::Pending);
        assert!(job.image_url().is_none());
        assert_eq!(job.styled_prompt(), "boat, cyberpunk style");
    }

    #[test]
    fn failed_job_is_terminal() -> Result<(), QueueError> {
        let mut job = PromptJob::new(2, "boat", &style());
        job.start_processing()?;
        job.fail_generation("quota".to_string())?;
        assert_eq!(job.error(), Some("quota"));
        assert_eq!(
            job.start_processing(),
            Err(QueueError::InvalidTransition {
                id: 2,
                from: JobStatus::Failed,
                to: JobStatus::Processing,
            })
        );
        Ok(())
    }

    #[test]
    fn failed_refinement_keeps_image_and_records_error() -> Result<(), QueueError> {
        let mut job = PromptJob::new(3, "boat", &style());
        job.start_processing()?;
        job.finish_generation("data:image/png;base64,AAA".to_string())?;
        let current = job.start_refinement()?;
        assert_eq!(current, "data:image/png;base64,AAA");
        assert_eq!(job.status(), JobStatus::Refining);
        job.fail_refinement("edit rejected".to_string())?;
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.image_url(), Some("data:image/png;base64,AAA"));
        assert_eq!(job.refinement_error(), Some("edit rejected"));
        assert!(job.error().is_none());

        job.start_refinement()?;
        job.finish_refinement("data:image/png;base64,BBB".to_string())?;
        assert_eq!(job.image_url(), Some("data:image/png;base64,BBB"));
        assert!(job.refinement_error().is_none());
        assert_eq!(job.styled_prompt(), "boat, cyberpunk style");
        Ok(())
    }
}
