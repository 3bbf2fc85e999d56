//! Collaborators the binary runs with out of the box: keyword heuristics plus
//! the TensorZero gateway for free text.

use super::{
    AiGenerator, AttributeMapper, CategoryPrediction, CategoryResolver, CategoryValidation,
    CollaboratorError, Collaborators, ContentRepository, DescriptionGenerator, PriceEstimate,
    TitleGenerator,
};
use crate::compliance::quality;
use crate::listing::features::capitalize;
use crate::listing::models::{description_length_error, title_length_error, truncate_title};
use crate::listing::{ImageInsights, ItemCondition, ListingAttribute, ProductFeatures, ProductImage};
use crate::llm::{AiClient, ChatMessage};
use async_trait::async_trait;
use serde::Deserialize;
use std::{collections::BTreeMap, collections::BTreeSet, sync::Arc};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct CategoryDefinition {
    pub id: &'static str,
    pub name: &'static str,
    keywords: &'static [&'static str],
}

pub const CATEGORY_POOL: [CategoryDefinition; 6] = [
    CategoryDefinition {
        id: "MLA1292",
        name: "Bicicletas",
        keywords: &["bicicleta", "bici", "mountain", "rodado", "bmx", "playera"],
    },
    CategoryDefinition {
        id: "MLA1055",
        name: "Celulares y Smartphones",
        keywords: &["celular", "smartphone", "iphone", "samsung", "motorola", "xiaomi"],
    },
    CategoryDefinition {
        id: "MLA109027",
        name: "Zapatillas",
        keywords: &["zapatillas", "zapatilla", "sneakers", "running", "botines"],
    },
    CategoryDefinition {
        id: "MLA1652",
        name: "Notebooks",
        keywords: &["notebook", "laptop", "macbook", "ultrabook", "chromebook"],
    },
    CategoryDefinition {
        id: "MLA1574",
        name: "Hogar, Muebles y Jardín",
        keywords: &["mesa", "silla", "sillón", "sillon", "mueble", "lámpara", "lampara"],
    },
    CategoryDefinition {
        id: "MLA1276",
        name: "Deportes y Fitness",
        keywords: &["pelota", "mancuernas", "pesas", "raqueta", "colchoneta"],
    },
];

/// Scores the pool by keyword overlap with the extracted features.
pub struct KeywordCategoryResolver {
    pool: &'static [CategoryDefinition],
}

impl Default for KeywordCategoryResolver {
    fn default() -> Self {
        Self {
            pool: &CATEGORY_POOL,
        }
    }
}

impl KeywordCategoryResolver {
    fn find(&self, id: &str) -> Option<&CategoryDefinition> {
        self.pool.iter().find(|c| c.id.eq_ignore_ascii_case(id.trim()))
    }

    fn hits(category: &CategoryDefinition, features: &ProductFeatures) -> usize {
        let mut terms: BTreeSet<String> = features.keywords.iter().cloned().collect();
        if let Some(kind) = &features.product_type {
            terms.insert(kind.to_lowercase());
        }
        terms.extend(features.specs.keys().cloned());
        category
            .keywords
            .iter()
            .filter(|k| terms.contains(**k))
            .count()
    }
}

#[async_trait]
impl CategoryResolver for KeywordCategoryResolver {
    async fn predict(
        &self,
        features: &ProductFeatures,
        hint: Option<&str>,
    ) -> Result<CategoryPrediction, CollaboratorError> {
        if let Some(category) = hint.and_then(|h| self.find(h)) {
            return Ok(CategoryPrediction {
                category_id: category.id.to_string(),
                category_name: category.name.to_string(),
                confidence: 0.9,
            });
        }
        let best = self
            .pool
            .iter()
            .map(|c| (c, Self::hits(c, features)))
            .filter(|(_, hits)| *hits > 0)
            .max_by_key(|(_, hits)| *hits);
        match best {
            Some((category, hits)) => {
                debug!(target = "hermes.category", category = category.id, hits, "category_matched");
                Ok(CategoryPrediction {
                    category_id: category.id.to_string(),
                    category_name: category.name.to_string(),
                    confidence: (0.55 + 0.15 * hits as f64).min(0.95),
                })
            }
            None => Err(CollaboratorError::CategoryDetection(format!(
                "no category matched `{}`",
                features.headline()
            ))),
        }
    }

    async fn validate(
        &self,
        category_id: &str,
        _features: &ProductFeatures,
    ) -> Result<CategoryValidation, CollaboratorError> {
        Ok(match self.find(category_id) {
            Some(_) => CategoryValidation {
                is_valid: true,
                errors: vec![],
            },
            None => CategoryValidation {
                is_valid: false,
                errors: vec![format!("unknown category {category_id}")],
            },
        })
    }
}

/// Builds titles from feature fields: type, brand, model, specs, condition.
#[derive(Default)]
pub struct TemplateTitleGenerator;

#[async_trait]
impl TitleGenerator for TemplateTitleGenerator {
    async fn generate(
        &self,
        features: &ProductFeatures,
        category: &CategoryPrediction,
        extra: Option<&str>,
    ) -> Result<String, CollaboratorError> {
        let mut parts: Vec<String> = Vec::new();
        let head = features.headline();
        parts.push(if head.is_empty() {
            category.category_name.clone()
        } else {
            head
        });
        for (key, value) in features.specs.iter().take(2) {
            parts.push(format!("{} {value}", capitalize(key)));
        }
        if let Some(color) = &features.color {
            parts.push(capitalize(color));
        }
        if let Some(extra) = extra.map(str::trim).filter(|e| !e.is_empty()) {
            parts.push(extra.to_string());
        }
        if let Some(condition) = features.condition.filter(|c| *c != ItemCondition::New) {
            parts.push(condition.label().to_string());
        }
        let title = truncate_title(&parts.join(" "));
        match title_length_error(&title) {
            None => Ok(title),
            Some(err) => Err(CollaboratorError::InvalidOutput(err)),
        }
    }

    fn validate(&self, title: &str) -> Vec<String> {
        title_length_error(title).into_iter().collect()
    }

    fn confidence(&self, title: &str, features: &ProductFeatures) -> f64 {
        let mut value: f64 = 0.5;
        if features.brand.is_some() {
            value += 0.1;
        }
        if features.model.is_some() {
            value += 0.1;
        }
        if !features.specs.is_empty() {
            value += 0.1;
        }
        if quality::has_numeric_token(title) {
            value += 0.1;
        }
        value.min(0.95)
    }
}

/// Free-text description through the gateway.
pub struct GatewayDescriptionGenerator {
    ai: Arc<AiClient>,
}

impl GatewayDescriptionGenerator {
    pub fn new(ai: Arc<AiClient>) -> Self {
        Self { ai }
    }
}

fn feature_bullets(features: &ProductFeatures) -> Vec<String> {
    let mut bullets = Vec::new();
    for (label, value) in [
        ("Marca", &features.brand),
        ("Modelo", &features.model),
        ("Color", &features.color),
        ("Material", &features.material),
        ("Medida", &features.size),
    ] {
        if let Some(value) = value {
            bullets.push(format!("{label}: {value}"));
        }
    }
    for (key, value) in &features.specs {
        bullets.push(format!("{}: {value}", capitalize(key)));
    }
    if let Some(condition) = features.condition {
        bullets.push(format!("Condición: {}", condition.label()));
    }
    bullets
}

#[async_trait]
impl DescriptionGenerator for GatewayDescriptionGenerator {
    async fn generate(
        &self,
        features: &ProductFeatures,
        title: &str,
        category: &CategoryPrediction,
        extra: Option<&str>,
    ) -> Result<String, CollaboratorError> {
        let bullets = feature_bullets(features);
        let mut prompt = format!(
            "Escribí una descripción para MercadoLibre, en español, sin datos de contacto ni links. \
             Título: {title}. Categoría: {category}. Características: {bullets:?}. \
             Pedido del vendedor: {seller}.",
            category = category.category_name,
            seller = features.prompt,
        );
        if let Some(audience) = &features.target_audience {
            prompt.push_str(&format!(" Público: {audience}."));
        }
        if let Some(extra) = extra {
            prompt.push_str(&format!(" Indicaciones extra: {extra}."));
        }
        let text = self
            .ai
            .complete(&[
                ChatMessage::system(
                    "Sos redactor de publicaciones de marketplace. Usá párrafos cortos y una lista con guiones.",
                ),
                ChatMessage::user(prompt),
            ])
            .await?;
        let text = text.trim().to_string();
        match description_length_error(&text) {
            None => Ok(text),
            Some(err) => Err(CollaboratorError::InvalidOutput(err)),
        }
    }

    fn validate(&self, description: &str) -> Vec<String> {
        description_length_error(description).into_iter().collect()
    }

    fn confidence(&self, description: &str, _features: &ProductFeatures) -> f64 {
        let mut value = 0.6;
        if quality::has_bullets(description) {
            value += 0.1;
        }
        if quality::paragraphs(description).len() >= 2 {
            value += 0.1;
        }
        if description.chars().count() >= 200 {
            value += 0.1;
        }
        value
    }
}

/// Maps named feature fields and specs onto marketplace attribute ids.
#[derive(Default)]
pub struct CatalogAttributeMapper;

fn attribute_id(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

#[async_trait]
impl AttributeMapper for CatalogAttributeMapper {
    async fn generate(
        &self,
        features: &ProductFeatures,
        _category_id: &str,
    ) -> Result<Vec<ListingAttribute>, CollaboratorError> {
        let mut attributes = Vec::new();
        for (id, name, value) in [
            ("BRAND", "Marca", &features.brand),
            ("MODEL", "Modelo", &features.model),
            ("COLOR", "Color", &features.color),
            ("MATERIAL", "Material", &features.material),
            ("SIZE", "Tamaño", &features.size),
        ] {
            if let Some(value) = value {
                attributes.push(ListingAttribute::new(id, name, value.clone()));
            }
        }
        if let Some(condition) = features.condition {
            attributes.push(ListingAttribute::new(
                "ITEM_CONDITION",
                "Condición",
                condition.label(),
            ));
        }
        for (key, value) in &features.specs {
            let id = attribute_id(key);
            if attributes.iter().all(|a| a.id != id) {
                attributes.push(ListingAttribute::new(&id, &capitalize(key), value.clone()));
            }
        }
        Ok(attributes)
    }

    fn validate(&self, attributes: &[ListingAttribute], _category_id: &str) -> Vec<String> {
        let mut errors = Vec::new();
        let mut seen = BTreeSet::new();
        for attribute in attributes {
            if !seen.insert(attribute.id.as_str()) {
                errors.push(format!("attribute {} appears twice", attribute.id));
            }
            if attribute.value_name.trim().is_empty() {
                errors.push(format!("attribute {} has no value", attribute.id));
            }
        }
        errors
    }

    fn confidence(&self, attributes: &[ListingAttribute], _features: &ProductFeatures) -> f64 {
        if attributes.is_empty() {
            0.2
        } else {
            (0.4 + 0.1 * attributes.len() as f64).min(0.9)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FeatureHints {
    product_type: Option<String>,
    brand: Option<String>,
    model: Option<String>,
    color: Option<String>,
    material: Option<String>,
    size: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    specs: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct PriceHint {
    amount: f64,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Image screening plus gateway-backed feature extraction and pricing.
pub struct GatewayAiGenerator {
    ai: Arc<AiClient>,
    currency: String,
}

/// Smallest side MercadoLibre accepts without flagging the photo.
const MIN_IMAGE_SIDE: u32 = 500;

impl GatewayAiGenerator {
    pub fn new(ai: Arc<AiClient>, currency: impl Into<String>) -> Self {
        Self {
            ai,
            currency: currency.into(),
        }
    }
}

#[async_trait]
impl AiGenerator for GatewayAiGenerator {
    async fn analyze_images(
        &self,
        images: &[ProductImage],
    ) -> Result<ImageInsights, CollaboratorError> {
        if images.is_empty() {
            return Err(CollaboratorError::InvalidOutput("no images to analyse".into()));
        }
        let usable = images
            .iter()
            .filter(|img| img.url.starts_with("https://") || img.url.starts_with("http://"))
            .filter(|img| img.width.min(img.height) >= MIN_IMAGE_SIDE)
            .count();
        let labels: BTreeSet<String> = images.iter().map(|img| img.format.to_lowercase()).collect();
        Ok(ImageInsights {
            image_count: images.len(),
            usable_images: usable,
            labels: labels.into_iter().collect(),
            quality: usable as f64 / images.len() as f64,
        })
    }

    async fn extract_features(
        &self,
        images: &[ProductImage],
        prompt: &str,
    ) -> Result<ProductFeatures, CollaboratorError> {
        let hints: FeatureHints = self
            .ai
            .complete_json(&[
                ChatMessage::system(
                    "Extract product facts as JSON with keys product_type, brand, model, color, \
                     material, size, keywords (array) and specs (object of strings). Use null when unknown.",
                ),
                ChatMessage::user(format!("Prompt: {prompt}. Images: {}", images.len())),
            ])
            .await?;

        let mut features = ProductFeatures::from_prompt(prompt, None);
        for (slot, value) in [
            (&mut features.product_type, hints.product_type),
            (&mut features.brand, hints.brand),
            (&mut features.model, hints.model),
            (&mut features.color, hints.color),
            (&mut features.material, hints.material),
            (&mut features.size, hints.size),
        ] {
            if value.is_some() {
                *slot = value;
            }
        }
        features.keywords.extend(hints.keywords);
        features.specs.extend(hints.specs);
        features.normalize();
        Ok(features)
    }

    async fn estimate_price(
        &self,
        features: &ProductFeatures,
        category_id: &str,
    ) -> Result<PriceEstimate, CollaboratorError> {
        let hint: PriceHint = self
            .ai
            .complete_json(&[
                ChatMessage::system(format!(
                    "Estimate a selling price in {} as JSON {{\"amount\": number, \"confidence\": 0..1}}.",
                    self.currency
                )),
                ChatMessage::user(format!(
                    "Category {category_id}. Product: {}. Details: {:?}",
                    features.headline(),
                    features.specs
                )),
            ])
            .await?;
        if !(hint.amount.is_finite() && hint.amount > 0.0) {
            return Err(CollaboratorError::InvalidOutput(format!(
                "price estimate {} is not positive",
                hint.amount
            )));
        }
        Ok(PriceEstimate {
            amount: hint.amount,
            currency: Some(self.currency.clone()),
            confidence: hint.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
        })
    }
}

/// Default wiring for the binary.
pub fn collaborators(
    ai: Arc<AiClient>,
    repository: Arc<dyn ContentRepository>,
    currency: &str,
) -> Collaborators {
    Collaborators {
        repository,
        categories: Arc::new(KeywordCategoryResolver::default()),
        titles: Arc::new(TemplateTitleGenerator),
        descriptions: Arc::new(GatewayDescriptionGenerator::new(ai.clone())),
        attributes: Arc::new(CatalogAttributeMapper),
        ai: Arc::new(GatewayAiGenerator::new(ai, currency)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bike() -> ProductFeatures {
        ProductFeatures::from_prompt("Bicicleta rodado 26 usada", None)
    }

    #[tokio::test]
    async fn resolver_matches_keywords() {
        let resolver = KeywordCategoryResolver::default();
        let prediction = resolver.predict(&bike(), None).await.unwrap();
        assert_eq!(prediction.category_id, "MLA1292");
        assert!(prediction.confidence > 0.55);
        assert!(resolver.validate("MLA1292", &bike()).await.unwrap().is_valid);
        assert!(!resolver.validate("MLA0", &bike()).await.unwrap().is_valid);
    }

    #[tokio::test]
    async fn resolver_prefers_a_known_hint_and_fails_without_signal() {
        let resolver = KeywordCategoryResolver::default();
        let hinted = resolver.predict(&bike(), Some("mla1652")).await.unwrap();
        assert_eq!(hinted.category_name, "Notebooks");
        let unknown = ProductFeatures::from_prompt("Cosa rara", None);
        assert!(matches!(
            resolver.predict(&unknown, None).await,
            Err(CollaboratorError::CategoryDetection(_))
        ));
    }

    #[tokio::test]
    async fn template_title_fits_the_window() {
        let category = CategoryPrediction {
            category_id: "MLA1292".into(),
            category_name: "Bicicletas".into(),
            confidence: 0.7,
        };
        let title = TemplateTitleGenerator
            .generate(&bike(), &category, None)
            .await
            .unwrap();
        assert_eq!(title, "Bicicleta Rodado 26 Usado");
        assert!(TemplateTitleGenerator.validate(&title).is_empty());
    }

    #[tokio::test]
    async fn attribute_mapper_covers_condition_and_specs() {
        let attributes = CatalogAttributeMapper.generate(&bike(), "MLA1292").await.unwrap();
        let ids: Vec<&str> = attributes.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["ITEM_CONDITION", "RODADO"]);
        assert!(CatalogAttributeMapper.validate(&attributes, "MLA1292").is_empty());
    }

    #[tokio::test]
    async fn image_screening_counts_usable_photos() {
        let ai = Arc::new(AiClient::new(
            crate::llm::GatewayConfig {
                gateway_url: String::new(),
                api_key: None,
                function_name: None,
                model: None,
            },
            crate::retry::BackoffPolicy::default(),
        ));
        let generator = GatewayAiGenerator::new(ai, "ARS");
        let images = vec![
            ProductImage {
                key: "a".into(),
                url: "https://cdn.example.com/a.jpg".into(),
                format: "JPG".into(),
                width: 1200,
                height: 900,
            },
            ProductImage {
                key: "b".into(),
                url: "https://cdn.example.com/b.png".into(),
                format: "png".into(),
                width: 320,
                height: 240,
            },
        ];
        let insights = generator.analyze_images(&images).await.unwrap();
        assert_eq!(insights.usable_images, 1);
        assert_eq!(insights.quality, 0.5);
        assert_eq!(insights.labels, vec!["jpg".to_string(), "png".to_string()]);
    }
}
