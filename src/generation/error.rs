use super::state::TransitionError;
use crate::collaborators::{CollaboratorError, RepositoryError};
use crate::listing::ConfidenceError;
use crate::llm::AiServiceError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generated content failed structural validation: {}", .0.join("; "))]
    StructuralValidation(Vec<String>),
    #[error("category detection failed: {0}")]
    CategoryDetection(String),
    #[error(transparent)]
    AiService(AiServiceError),
    #[error("ai provider rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("collaborator failed: {0}")]
    Collaborator(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl GenerationError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable machine code recorded on failed runs and returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::StructuralValidation(_) => "STRUCTURAL_VALIDATION_ERROR",
            GenerationError::CategoryDetection(_) => "CATEGORY_DETECTION_ERROR",
            GenerationError::AiService(_) => "AI_SERVICE_ERROR",
            GenerationError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            GenerationError::NotFound { .. } => "ENTITY_NOT_FOUND",
            GenerationError::Repository(_) => "REPOSITORY_ERROR",
            GenerationError::InvalidRequest(_) => "INVALID_REQUEST",
            GenerationError::Collaborator(_) => "COLLABORATOR_ERROR",
            GenerationError::Transition(_) => "INVALID_STATE_TRANSITION",
            GenerationError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GenerationError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<AiServiceError> for GenerationError {
    fn from(value: AiServiceError) -> Self {
        match value {
            AiServiceError::RateLimited { retry_after, .. } => Self::RateLimited { retry_after },
            other => Self::AiService(other),
        }
    }
}

impl From<CollaboratorError> for GenerationError {
    fn from(value: CollaboratorError) -> Self {
        match value {
            CollaboratorError::Ai(err) => err.into(),
            CollaboratorError::CategoryDetection(message) => Self::CategoryDetection(message),
            other => Self::Collaborator(other.to_string()),
        }
    }
}

impl From<ConfidenceError> for GenerationError {
    fn from(value: ConfidenceError) -> Self {
        Self::StructuralValidation(vec![value.to_string()])
    }
}
