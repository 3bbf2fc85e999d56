use super::steps::{GenerationStep, TOTAL_STEPS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::{fmt, time::Duration};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Pending => "pending",
            StatusKind::Processing => "processing",
            StatusKind::Completed => "completed",
            StatusKind::Failed => "failed",
            StatusKind::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatusKind::Completed | StatusKind::Failed | StatusKind::Cancelled
        )
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allowed status moves. `Processing -> Processing` is a progress update.
pub fn can_transition(from: StatusKind, to: StatusKind) -> bool {
    use StatusKind::*;
    matches!(
        (from, to),
        (Pending, Processing)
            | (Processing, Processing)
            | (Processing, Completed)
            | (Processing, Failed)
            | (Processing, Cancelled)
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Processing {
        step: Option<GenerationStep>,
        progress: f64,
    },
    Completed {
        content_id: Uuid,
        elapsed_ms: u64,
    },
    Failed {
        code: String,
        message: String,
        step: Option<GenerationStep>,
        progress: f64,
    },
    Cancelled {
        step: Option<GenerationStep>,
        progress: f64,
    },
}

impl GenerationStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            GenerationStatus::Pending => StatusKind::Pending,
            GenerationStatus::Processing { .. } => StatusKind::Processing,
            GenerationStatus::Completed { .. } => StatusKind::Completed,
            GenerationStatus::Failed { .. } => StatusKind::Failed,
            GenerationStatus::Cancelled { .. } => StatusKind::Cancelled,
        }
    }

    pub fn progress(&self) -> f64 {
        match self {
            GenerationStatus::Pending => 0.0,
            GenerationStatus::Completed { .. } => 100.0,
            GenerationStatus::Processing { progress, .. }
            | GenerationStatus::Failed { progress, .. }
            | GenerationStatus::Cancelled { progress, .. } => *progress,
        }
    }

    pub fn step(&self) -> Option<GenerationStep> {
        match self {
            GenerationStatus::Processing { step, .. }
            | GenerationStatus::Failed { step, .. }
            | GenerationStatus::Cancelled { step, .. } => *step,
            GenerationStatus::Pending => None,
            GenerationStatus::Completed { .. } => Some(GenerationStep::Finalization),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("cannot move generation from {from} to {to}")]
    Illegal { from: StatusKind, to: StatusKind },
    #[error("progress {requested} would go backwards from {current}")]
    Regression { current: f64, requested: f64 },
    #[error("progress {0} is outside [0, 100]")]
    OutOfRange(f64),
}

/// One generation run. Owned by the task executing it; everyone else reads
/// [`ProgressInfo`] snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationState {
    pub id: Uuid,
    pub product_id: String,
    status: GenerationStatus,
    completed_steps: Vec<GenerationStep>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    estimated_total: Duration,
}

impl GenerationState {
    pub fn new(id: Uuid, product_id: impl Into<String>, estimated_total: Duration) -> Self {
        Self {
            id,
            product_id: product_id.into(),
            status: GenerationStatus::Pending,
            completed_steps: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            estimated_total,
        }
    }

    /// A run that was satisfied by content stored earlier; no step ran.
    pub fn already_completed(
        id: Uuid,
        product_id: impl Into<String>,
        content_id: Uuid,
        estimated_total: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            status: GenerationStatus::Completed {
                content_id,
                elapsed_ms: 0,
            },
            started_at: Some(now),
            completed_at: Some(now),
            ..Self::new(id, product_id, estimated_total)
        }
    }

    pub fn status(&self) -> &GenerationStatus {
        &self.status
    }

    pub fn kind(&self) -> StatusKind {
        self.status.kind()
    }

    pub fn progress(&self) -> f64 {
        self.status.progress()
    }

    pub fn current_step(&self) -> Option<GenerationStep> {
        self.status.step()
    }

    pub fn completed_steps(&self) -> &[GenerationStep] {
        &self.completed_steps
    }

    pub fn content_id(&self) -> Option<Uuid> {
        match &self.status {
            GenerationStatus::Completed { content_id, .. } => Some(*content_id),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<(&str, &str)> {
        match &self.status {
            GenerationStatus::Failed { code, message, .. } => Some((code, message)),
            _ => None,
        }
    }

    fn guard(&self, to: StatusKind) -> Result<(), TransitionError> {
        let from = self.kind();
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(TransitionError::Illegal { from, to })
        }
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.guard(StatusKind::Processing)?;
        self.status = GenerationStatus::Processing {
            step: None,
            progress: 0.0,
        };
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Records `step` as finished at `progress`. Progress never decreases.
    pub fn advance(&mut self, step: GenerationStep, progress: f64) -> Result<(), TransitionError> {
        self.guard(StatusKind::Processing)?;
        if !(0.0..=100.0).contains(&progress) {
            return Err(TransitionError::OutOfRange(progress));
        }
        let current = self.progress();
        if progress < current {
            return Err(TransitionError::Regression {
                current,
                requested: progress,
            });
        }
        if !self.completed_steps.contains(&step) {
            self.completed_steps.push(step);
        }
        self.status = GenerationStatus::Processing {
            step: Some(step),
            progress,
        };
        Ok(())
    }

    pub fn complete(&mut self, content_id: Uuid, elapsed_ms: u64) -> Result<(), TransitionError> {
        self.guard(StatusKind::Completed)?;
        self.status = GenerationStatus::Completed {
            content_id,
            elapsed_ms,
        };
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `step` is the step that broke; `None` keeps the last recorded one.
    /// An empty message is replaced by the code so a failed run always
    /// carries something to display.
    pub fn fail(
        &mut self,
        step: Option<GenerationStep>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), TransitionError> {
        self.guard(StatusKind::Failed)?;
        let code = code.into();
        let mut message = message.into();
        if message.trim().is_empty() {
            message = code.clone();
        }
        self.status = GenerationStatus::Failed {
            code,
            message,
            step: step.or(self.current_step()),
            progress: self.progress(),
        };
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.guard(StatusKind::Cancelled)?;
        self.status = GenerationStatus::Cancelled {
            step: self.current_step(),
            progress: self.progress(),
        };
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Linear interpolation over the configured total estimate.
    pub fn estimated_remaining_time(&self) -> Duration {
        if self.kind().is_terminal() {
            return Duration::ZERO;
        }
        let remaining = (1.0 - self.progress() / 100.0).max(0.0);
        self.estimated_total.mul_f64(remaining)
    }

    /// Sum of the weights of finished steps.
    pub fn weighted_percentage(&self) -> f64 {
        if self.kind() == StatusKind::Completed {
            return 100.0;
        }
        self.completed_steps
            .iter()
            .map(GenerationStep::weight)
            .sum::<f64>()
            .min(100.0)
    }

    pub fn progress_info(&self) -> ProgressInfo {
        let error = self.error();
        ProgressInfo {
            processing_id: self.id,
            product_id: self.product_id.clone(),
            status: self.kind(),
            current_step: self.current_step(),
            progress_percentage: self.progress(),
            weighted_percentage: self.weighted_percentage(),
            completed_steps: self.completed_steps.clone(),
            total_steps: TOTAL_STEPS,
            estimated_remaining_seconds: self.estimated_remaining_time().as_secs(),
            content_id: self.content_id(),
            error_code: error.map(|(code, _)| code.to_string()),
            error_message: error.map(|(_, message)| message.to_string()),
            updated_at: Utc::now(),
        }
    }
}

/// Read-only snapshot of a run for polling and progress frames.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressInfo {
    pub processing_id: Uuid,
    pub product_id: String,
    pub status: StatusKind,
    pub current_step: Option<GenerationStep>,
    pub progress_percentage: f64,
    pub weighted_percentage: f64,
    pub completed_steps: Vec<GenerationStep>,
    pub total_steps: usize,
    pub estimated_remaining_seconds: u64,
    pub content_id: Option<Uuid>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> GenerationState {
        let mut state = GenerationState::new(Uuid::new_v4(), "P1", Duration::from_secs(40));
        state.start().unwrap();
        state
    }

    #[test]
    fn transition_table() {
        use StatusKind::*;
        assert!(can_transition(Pending, Processing));
        assert!(can_transition(Processing, Cancelled));
        assert!(!can_transition(Pending, Completed));
        for terminal in [Completed, Failed, Cancelled] {
            for to in [Pending, Processing, Completed, Failed, Cancelled] {
                assert!(!can_transition(terminal, to), "{terminal} -> {to}");
            }
        }
    }

    #[test]
    fn progress_is_monotone_and_bounded() {
        let mut state = running();
        state.advance(GenerationStep::ImageAnalysis, 10.0).unwrap();
        assert_eq!(
            state.advance(GenerationStep::FeatureExtraction, 5.0),
            Err(TransitionError::Regression {
                current: 10.0,
                requested: 5.0
            })
        );
        assert_eq!(
            state.advance(GenerationStep::FeatureExtraction, 120.0),
            Err(TransitionError::OutOfRange(120.0))
        );
        assert_eq!(state.progress(), 10.0);
    }

    #[test]
    fn completed_carries_content_id_and_is_final() {
        let mut state = running();
        let content_id = Uuid::new_v4();
        state.complete(content_id, 1200).unwrap();
        assert_eq!(state.content_id(), Some(content_id));
        assert_eq!(state.progress(), 100.0);
        assert!(state.error().is_none());
        assert!(state.fail(None, "X", "late").is_err());
        assert!(state.advance(GenerationStep::Finalization, 100.0).is_err());
    }

    #[test]
    fn failed_keeps_step_progress_and_a_message() {
        let mut state = running();
        state.advance(GenerationStep::CategoryDetection, 35.0).unwrap();
        state
            .fail(Some(GenerationStep::TitleGeneration), "STRUCTURAL_VALIDATION_ERROR", "")
            .unwrap();
        let (code, message) = state.error().unwrap();
        assert_eq!(code, "STRUCTURAL_VALIDATION_ERROR");
        assert!(!message.is_empty());
        assert_eq!(state.current_step(), Some(GenerationStep::TitleGeneration));
        assert_eq!(state.progress(), 35.0);
        assert!(state.content_id().is_none());
    }

    #[test]
    fn pending_cannot_complete_or_cancel() {
        let mut state = GenerationState::new(Uuid::new_v4(), "P1", Duration::from_secs(1));
        assert!(state.complete(Uuid::new_v4(), 0).is_err());
        assert!(state.cancel().is_err());
    }

    #[test]
    fn cancel_from_processing() {
        let mut state = running();
        state.advance(GenerationStep::ImageAnalysis, 10.0).unwrap();
        state.cancel().unwrap();
        assert_eq!(state.kind(), StatusKind::Cancelled);
        assert!(state.start().is_err());
    }

    #[test]
    fn remaining_time_interpolates_and_floors() {
        let mut state = running();
        assert_eq!(state.estimated_remaining_time(), Duration::from_secs(40));
        state.advance(GenerationStep::PriceEstimation, 75.0).unwrap();
        assert_eq!(state.estimated_remaining_time(), Duration::from_secs(10));
        state.complete(Uuid::new_v4(), 5).unwrap();
        assert_eq!(state.estimated_remaining_time(), Duration::ZERO);
    }

    #[test]
    fn weighted_percentage_differs_from_milestones() {
        let mut state = running();
        state
            .advance(GenerationStep::ImageAnalysis, GenerationStep::ImageAnalysis.milestone())
            .unwrap();
        let info = state.progress_info();
        assert_eq!(info.progress_percentage, 10.0);
        assert_eq!(info.weighted_percentage, 15.0);
        assert_eq!(info.total_steps, 9);
        assert_eq!(info.completed_steps, vec![GenerationStep::ImageAnalysis]);
    }

    #[test]
    fn shortcut_state_is_completed() {
        let content_id = Uuid::new_v4();
        let state =
            GenerationState::already_completed(Uuid::new_v4(), "P1", content_id, Duration::from_secs(1));
        let info = state.progress_info();
        assert_eq!(info.status, StatusKind::Completed);
        assert_eq!(info.content_id, Some(content_id));
        assert_eq!(info.progress_percentage, 100.0);
    }
}
