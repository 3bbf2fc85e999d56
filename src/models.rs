use crate::generation::{GenerationStep, ProgressInfo, StatusKind, TOTAL_STEPS};
use crate::listing::Aspect;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Returned by `POST /generations`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    pub processing_id: Uuid,
    pub status: StatusKind,
    pub estimated_completion_seconds: u64,
    pub progress: ProgressSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressSummary {
    pub current_step: Option<GenerationStep>,
    pub total_steps: usize,
    pub percentage: f64,
}

impl GenerateResponse {
    pub fn accepted(info: &ProgressInfo, estimated_completion_seconds: u64) -> Self {
        Self {
            processing_id: info.processing_id,
            status: info.status,
            estimated_completion_seconds,
            progress: ProgressSummary {
                current_step: info.current_step,
                total_steps: TOTAL_STEPS,
                percentage: info.progress_percentage,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnhanceRequest {
    pub aspect: Aspect,
    #[serde(default)]
    pub extra: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
