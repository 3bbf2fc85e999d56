//! Contracts the orchestrator consumes. Implementations live in the
//! submodules; the pipeline only ever sees the traits.

pub mod demo;
pub mod memory;
pub mod redis_store;
#[cfg(test)]
pub mod testing;

use crate::listing::{GeneratedContent, ImageInsights, ListingAttribute, ProductFeatures, ProductImage};
use crate::llm::AiServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error(transparent)]
    Ai(#[from] AiServiceError),
    #[error("category detection failed: {0}")]
    CategoryDetection(String),
    #[error("collaborator returned unusable output: {0}")]
    InvalidOutput(String),
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("content store unavailable: {0}")]
    Backend(String),
    #[error("content {0} does not exist")]
    Missing(Uuid),
    #[error("stored content could not be decoded: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPrediction {
    pub category_id: String,
    pub category_name: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryValidation {
    pub is_valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEstimate {
    pub amount: f64,
    pub currency: Option<String>,
    pub confidence: f64,
}

/// Versioned content store. `save` starts a history, `update` appends to it.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn get_by_product_id(
        &self,
        product_id: &str,
    ) -> Result<Option<GeneratedContent>, RepositoryError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<GeneratedContent>, RepositoryError>;
    async fn save(&self, content: &GeneratedContent) -> Result<(), RepositoryError>;
    async fn update(&self, content: &GeneratedContent) -> Result<(), RepositoryError>;
    /// Oldest first.
    async fn list_versions(&self, id: Uuid) -> Result<Vec<GeneratedContent>, RepositoryError>;
}

#[async_trait]
pub trait CategoryResolver: Send + Sync {
    async fn predict(
        &self,
        features: &ProductFeatures,
        hint: Option<&str>,
    ) -> Result<CategoryPrediction, CollaboratorError>;
    async fn validate(
        &self,
        category_id: &str,
        features: &ProductFeatures,
    ) -> Result<CategoryValidation, CollaboratorError>;
}

#[async_trait]
pub trait TitleGenerator: Send + Sync {
    async fn generate(
        &self,
        features: &ProductFeatures,
        category: &CategoryPrediction,
        extra: Option<&str>,
    ) -> Result<String, CollaboratorError>;
    /// Empty when the title is acceptable.
    fn validate(&self, title: &str) -> Vec<String>;
    fn confidence(&self, title: &str, features: &ProductFeatures) -> f64;
}

#[async_trait]
pub trait DescriptionGenerator: Send + Sync {
    async fn generate(
        &self,
        features: &ProductFeatures,
        title: &str,
        category: &CategoryPrediction,
        extra: Option<&str>,
    ) -> Result<String, CollaboratorError>;
    fn validate(&self, description: &str) -> Vec<String>;
    fn confidence(&self, description: &str, features: &ProductFeatures) -> f64;
}

#[async_trait]
pub trait AttributeMapper: Send + Sync {
    async fn generate(
        &self,
        features: &ProductFeatures,
        category_id: &str,
    ) -> Result<Vec<ListingAttribute>, CollaboratorError>;
    fn validate(&self, attributes: &[ListingAttribute], category_id: &str) -> Vec<String>;
    fn confidence(&self, attributes: &[ListingAttribute], features: &ProductFeatures) -> f64;
}

#[async_trait]
pub trait AiGenerator: Send + Sync {
    async fn analyze_images(
        &self,
        images: &[ProductImage],
    ) -> Result<ImageInsights, CollaboratorError>;
    async fn extract_features(
        &self,
        images: &[ProductImage],
        prompt: &str,
    ) -> Result<ProductFeatures, CollaboratorError>;
    async fn estimate_price(
        &self,
        features: &ProductFeatures,
        category_id: &str,
    ) -> Result<PriceEstimate, CollaboratorError>;
}

/// Everything a generation run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub repository: Arc<dyn ContentRepository>,
    pub categories: Arc<dyn CategoryResolver>,
    pub titles: Arc<dyn TitleGenerator>,
    pub descriptions: Arc<dyn DescriptionGenerator>,
    pub attributes: Arc<dyn AttributeMapper>,
    pub ai: Arc<dyn AiGenerator>,
}
