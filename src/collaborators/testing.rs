//! Deterministic doubles with call counters.

use super::{
    AiGenerator, AttributeMapper, CategoryPrediction, CategoryResolver, CategoryValidation,
    CollaboratorError, Collaborators, DescriptionGenerator, PriceEstimate, TitleGenerator,
    memory::InMemoryContentRepository,
};
use crate::listing::{ImageInsights, ListingAttribute, ProductFeatures, ProductImage};
use async_trait::async_trait;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

pub const TITLE_CONFIDENCE: f64 = 0.9;
pub const DESCRIPTION_CONFIDENCE: f64 = 0.8;
pub const CATEGORY_CONFIDENCE: f64 = 0.85;
pub const PRICE_CONFIDENCE: f64 = 0.7;
pub const ATTRIBUTE_CONFIDENCE: f64 = 0.75;

fn boom(what: &str) -> CollaboratorError {
    CollaboratorError::Unavailable(format!("{what} exploded"))
}

#[derive(Default)]
pub struct MockAi {
    pub calls: AtomicUsize,
    pub fail: bool,
}

#[async_trait]
impl AiGenerator for MockAi {
    async fn analyze_images(
        &self,
        images: &[ProductImage],
    ) -> Result<ImageInsights, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(boom("image analysis"));
        }
        Ok(ImageInsights {
            image_count: images.len(),
            usable_images: images.len(),
            labels: vec!["bicycle".into()],
            quality: 0.9,
        })
    }

    async fn extract_features(
        &self,
        _images: &[ProductImage],
        prompt: &str,
    ) -> Result<ProductFeatures, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(boom("feature extraction"));
        }
        let mut features = ProductFeatures::from_prompt(prompt, None);
        features.brand = Some("Venzo".into());
        Ok(features)
    }

    async fn estimate_price(
        &self,
        _features: &ProductFeatures,
        _category_id: &str,
    ) -> Result<PriceEstimate, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(boom("price estimation"));
        }
        Ok(PriceEstimate {
            amount: 185_990.0,
            currency: Some("ARS".into()),
            confidence: PRICE_CONFIDENCE,
        })
    }
}

#[derive(Default)]
pub struct MockCategories {
    pub calls: AtomicUsize,
    pub fail: bool,
}

#[async_trait]
impl CategoryResolver for MockCategories {
    async fn predict(
        &self,
        _features: &ProductFeatures,
        hint: Option<&str>,
    ) -> Result<CategoryPrediction, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CollaboratorError::CategoryDetection("no match".into()));
        }
        Ok(CategoryPrediction {
            category_id: hint.unwrap_or("MLA1292").to_string(),
            category_name: "Bicicletas".into(),
            confidence: CATEGORY_CONFIDENCE,
        })
    }

    async fn validate(
        &self,
        _category_id: &str,
        _features: &ProductFeatures,
    ) -> Result<CategoryValidation, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CategoryValidation {
            is_valid: true,
            errors: vec![],
        })
    }
}

#[derive(Default)]
pub struct MockTitles {
    pub calls: AtomicUsize,
    pub fail: bool,
    /// Returned instead of the default title when set.
    pub fixed: Option<String>,
}

#[async_trait]
impl TitleGenerator for MockTitles {
    async fn generate(
        &self,
        _features: &ProductFeatures,
        _category: &CategoryPrediction,
        extra: Option<&str>,
    ) -> Result<String, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(boom("title generator"));
        }
        if let Some(fixed) = &self.fixed {
            return Ok(fixed.clone());
        }
        Ok(match extra {
            Some(extra) => format!("Bicicleta Venzo Rodado 26 {extra}"),
            None => "Bicicleta Venzo Rodado 26 Usada".to_string(),
        })
    }

    fn validate(&self, _title: &str) -> Vec<String> {
        Vec::new()
    }

    fn confidence(&self, _title: &str, _features: &ProductFeatures) -> f64 {
        TITLE_CONFIDENCE
    }
}

#[derive(Default)]
pub struct MockDescriptions {
    pub calls: AtomicUsize,
    pub fail: bool,
}

#[async_trait]
impl DescriptionGenerator for MockDescriptions {
    async fn generate(
        &self,
        _features: &ProductFeatures,
        title: &str,
        _category: &CategoryPrediction,
        _extra: Option<&str>,
    ) -> Result<String, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(boom("description generator"));
        }
        Ok(format!(
            "{title} en muy buen estado, lista para usar todos los días.\n\n- Rodado 26\n- 21 velocidades\n- Frenos V-brake"
        ))
    }

    fn validate(&self, _description: &str) -> Vec<String> {
        Vec::new()
    }

    fn confidence(&self, _description: &str, _features: &ProductFeatures) -> f64 {
        DESCRIPTION_CONFIDENCE
    }
}

#[derive(Default)]
pub struct MockAttributes {
    pub calls: AtomicUsize,
    pub fail: bool,
}

#[async_trait]
impl AttributeMapper for MockAttributes {
    async fn generate(
        &self,
        _features: &ProductFeatures,
        _category_id: &str,
    ) -> Result<Vec<ListingAttribute>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(boom("attribute mapper"));
        }
        Ok(vec![
            ListingAttribute::new("BRAND", "Marca", "Venzo"),
            ListingAttribute::new("WHEEL_SIZE", "Rodado", "26"),
            ListingAttribute::new("ITEM_CONDITION", "Condición", "Usado"),
        ])
    }

    fn validate(&self, _attributes: &[ListingAttribute], _category_id: &str) -> Vec<String> {
        Vec::new()
    }

    fn confidence(&self, _attributes: &[ListingAttribute], _features: &ProductFeatures) -> f64 {
        ATTRIBUTE_CONFIDENCE
    }
}

/// A full set of doubles sharing one in-memory repository.
#[derive(Clone, Default)]
pub struct MockSuite {
    pub repository: Arc<InMemoryContentRepository>,
    pub ai: Arc<MockAi>,
    pub categories: Arc<MockCategories>,
    pub titles: Arc<MockTitles>,
    pub descriptions: Arc<MockDescriptions>,
    pub attributes: Arc<MockAttributes>,
}

impl MockSuite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_titles(mut self, titles: MockTitles) -> Self {
        self.titles = Arc::new(titles);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            repository: self.repository.clone(),
            categories: self.categories.clone(),
            titles: self.titles.clone(),
            descriptions: self.descriptions.clone(),
            attributes: self.attributes.clone(),
            ai: self.ai.clone(),
        }
    }

    /// Calls made to everything except the repository.
    pub fn collaborator_calls(&self) -> usize {
        [
            &self.ai.calls,
            &self.categories.calls,
            &self.titles.calls,
            &self.descriptions.calls,
            &self.attributes.calls,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }

    pub fn expected_mean_confidence() -> f64 {
        (TITLE_CONFIDENCE
            + DESCRIPTION_CONFIDENCE
            + CATEGORY_CONFIDENCE
            + PRICE_CONFIDENCE
            + ATTRIBUTE_CONFIDENCE)
            / 5.0
    }
}
