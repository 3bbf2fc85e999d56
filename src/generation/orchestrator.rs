use super::error::GenerationError;
use super::state::{GenerationState, ProgressInfo, StatusKind};
use super::steps::{GenerationStep, StepOutcome};
use crate::collaborators::{CategoryPrediction, CollaboratorError, Collaborators};
use crate::compliance::{ComplianceReport, ComplianceValidator, QualityBreakdown, ValidationOutcome};
use crate::config::ServiceConfig;
use crate::listing::confidence::{
    HIGH_CONFIDENCE_THRESHOLD, WEAK_COMPONENT_THRESHOLD, default_aspect_weights,
};
use crate::listing::models::{MIN_PRICE, TITLE_MIN_CHARS, truncate_title};
use crate::listing::{
    Aspect, BuyingMode, ConfidenceScore, ContentSummary, GeneratedContent, ImageInsights,
    ItemCondition, ListingAttribute, ListingType, Price, PriceRange, ProductFeatures, ProductImage,
    ProviderMetadata, SaleTerm, ShippingInfo,
};
use crate::metrics;
use crate::progress::{ProgressBroadcaster, ProgressMessage};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration, time::Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_CATEGORY_ID: &str = "MLA1953";
pub const DEFAULT_CATEGORY_NAME: &str = "Otros";
/// Used when no estimate and no price range are available.
pub const FALLBACK_PRICE: f64 = 1000.0;

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    pub product_id: String,
    pub images: Vec<ProductImage>,
    pub prompt: String,
    #[serde(default)]
    pub category_hint: Option<String>,
    #[serde(default)]
    pub price_range: Option<PriceRange>,
    #[serde(default)]
    pub target_audience: Option<String>,
    #[serde(default)]
    pub regenerate: bool,
}

impl GenerationRequest {
    pub fn validate(&self, max_images: usize) -> Result<(), GenerationError> {
        let mut problems = Vec::new();
        if self.product_id.trim().is_empty() {
            problems.push("product_id is required".to_string());
        }
        if self.prompt.trim().is_empty() {
            problems.push("prompt is required".to_string());
        }
        if self.images.is_empty() {
            problems.push("at least one image is required".to_string());
        } else if self.images.len() > max_images {
            problems.push(format!("at most {max_images} images are allowed"));
        }
        for image in &self.images {
            let url = image.url.trim();
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                problems.push(format!("image `{}` must use an http(s) url", image.key));
            }
        }
        if let Some(range) = self.price_range
            && !(range.min.is_finite()
                && range.max.is_finite()
                && range.min >= MIN_PRICE
                && range.min <= range.max)
        {
            problems.push(format!("price_range must satisfy {MIN_PRICE} <= min <= max"));
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(GenerationError::InvalidRequest(problems.join("; ")))
        }
    }

    fn hint(&self) -> Option<&str> {
        self.category_hint
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub estimated_total: Duration,
    pub fallback_confidence: f64,
    pub default_currency: String,
    pub max_images: usize,
    pub provider_label: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            estimated_total: Duration::from_secs(45),
            fallback_confidence: 0.3,
            default_currency: "ARS".into(),
            max_images: 10,
            provider_label: "demo".into(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_service(config: &ServiceConfig, provider_label: impl Into<String>) -> Self {
        Self {
            estimated_total: config.estimated_generation,
            fallback_confidence: config.fallback_confidence,
            default_currency: config.default_currency.clone(),
            max_images: config.max_images,
            provider_label: provider_label.into(),
        }
    }
}

/// Receives a snapshot every time a run's state changes.
#[async_trait]
pub trait StateObserver: Send + Sync {
    async fn observe(&self, info: ProgressInfo);
}

pub struct NoopObserver;

#[async_trait]
impl StateObserver for NoopObserver {
    async fn observe(&self, _info: ProgressInfo) {}
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceReport {
    pub overall: f64,
    pub weighted: f64,
    pub is_high_confidence: bool,
    pub weak_components: Vec<Aspect>,
}

/// Structural, compliance and quality verdict for stored content.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub content_id: Uuid,
    pub version: u32,
    pub outcome: ValidationOutcome,
    pub compliance: ComplianceReport,
    pub quality: QualityBreakdown,
    pub suggestions: Vec<String>,
    pub confidence: ConfidenceReport,
}

struct StepFailure {
    step: GenerationStep,
    error: GenerationError,
}

trait AtStep<T> {
    fn at(self, step: GenerationStep) -> Result<T, StepFailure>;
}

impl<T, E: Into<GenerationError>> AtStep<T> for Result<T, E> {
    fn at(self, step: GenerationStep) -> Result<T, StepFailure> {
        self.map_err(|err| StepFailure {
            step,
            error: err.into(),
        })
    }
}

/// Values gathered across the content steps of one run.
struct Draft {
    insights: ImageInsights,
    features: ProductFeatures,
    category: CategoryPrediction,
    title: String,
    description: String,
    attributes: Vec<ListingAttribute>,
    price: Price,
    breakdown: BTreeMap<Aspect, f64>,
    fallbacks: Vec<Aspect>,
}

pub struct GenerationOrchestrator {
    collaborators: Collaborators,
    validator: Arc<ComplianceValidator>,
    broadcaster: ProgressBroadcaster,
    config: OrchestratorConfig,
}

impl GenerationOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        validator: Arc<ComplianceValidator>,
        broadcaster: ProgressBroadcaster,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            collaborators,
            validator,
            broadcaster,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> &ProgressBroadcaster {
        &self.broadcaster
    }

    pub async fn execute(&self, request: GenerationRequest) -> Result<GenerationState, GenerationError> {
        self.execute_with_id(Uuid::new_v4(), request, &NoopObserver)
            .await
    }

    /// Runs one generation under `processing_id`.
    ///
    /// `Err` is returned only when the run never started (bad request or a
    /// failed lookup). Failures inside the pipeline come back as a FAILED state.
    pub async fn execute_with_id(
        &self,
        processing_id: Uuid,
        request: GenerationRequest,
        observer: &dyn StateObserver,
    ) -> Result<GenerationState, GenerationError> {
        request.validate(self.config.max_images)?;
        let previous = self
            .collaborators
            .repository
            .get_by_product_id(&request.product_id)
            .await?;

        if let (false, Some(existing)) = (request.regenerate, previous.as_ref()) {
            let state = GenerationState::already_completed(
                processing_id,
                &request.product_id,
                existing.id,
                self.config.estimated_total,
            );
            info!(
                target = "hermes.generation",
                %processing_id,
                product_id = %request.product_id,
                content_id = %existing.id,
                "generation_reused"
            );
            self.publish(&state, observer).await;
            self.broadcaster
                .broadcast(
                    processing_id,
                    ProgressMessage::completion(processing_id, existing.summary()),
                )
                .await;
            metrics::generation_finished(StatusKind::Completed.as_str(), 0);
            return Ok(state);
        }

        let mut state = GenerationState::new(
            processing_id,
            &request.product_id,
            self.config.estimated_total,
        );
        state.start()?;
        info!(
            target = "hermes.generation",
            %processing_id,
            product_id = %request.product_id,
            regenerate = request.regenerate,
            images = request.images.len(),
            "generation_started"
        );
        self.publish(&state, observer).await;

        let started = Instant::now();
        let outcome = self
            .run_steps(&mut state, &request, previous, observer)
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(content) => {
                state.complete(content.id, elapsed_ms)?;
                info!(
                    target = "hermes.generation",
                    %processing_id,
                    content_id = %content.id,
                    version = content.version,
                    overall_confidence = content.overall_confidence(),
                    elapsed_ms,
                    "generation_completed"
                );
                self.publish(&state, observer).await;
                self.broadcaster
                    .broadcast(
                        processing_id,
                        ProgressMessage::completion(processing_id, content.summary()),
                    )
                    .await;
            }
            Err(StepFailure { step, error }) => {
                error!(
                    target = "hermes.generation",
                    %processing_id,
                    step = step.as_str(),
                    code = error.code(),
                    error = %error,
                    "generation_failed"
                );
                state.fail(Some(step), error.code(), error.to_string())?;
                self.publish(&state, observer).await;
                self.broadcaster
                    .broadcast(
                        processing_id,
                        ProgressMessage::error(processing_id, error.to_string(), error.code()),
                    )
                    .await;
            }
        }
        metrics::generation_finished(state.kind().as_str(), elapsed_ms);
        Ok(state)
    }

    async fn publish(&self, state: &GenerationState, observer: &dyn StateObserver) {
        let info = state.progress_info();
        self.broadcaster
            .broadcast(state.id, ProgressMessage::progress(&info))
            .await;
        observer.observe(info).await;
    }

    async fn finish_step(
        &self,
        state: &mut GenerationState,
        step: GenerationStep,
        started: Instant,
        used_fallback: bool,
        timings: &mut BTreeMap<String, u64>,
        observer: &dyn StateObserver,
    ) -> Result<(), StepFailure> {
        let elapsed_ms = started.elapsed().as_millis();
        metrics::step_elapsed(step.as_str(), elapsed_ms);
        timings.insert(step.as_str().to_string(), elapsed_ms as u64);
        state.advance(step, step.milestone()).at(step)?;
        debug!(
            target = "hermes.generation",
            processing_id = %state.id,
            step = step.as_str(),
            index = step.ordinal(),
            progress = step.milestone(),
            used_fallback,
            "step_finished"
        );
        self.publish(state, observer).await;
        Ok(())
    }

    fn note_fallback(&self, processing_id: Uuid, step: GenerationStep, reason: &dyn fmt::Display) {
        warn!(
            target = "hermes.generation",
            %processing_id,
            step = step.as_str(),
            error = %reason,
            confidence = self.config.fallback_confidence,
            "step_fallback"
        );
        metrics::step_fallback(step.as_str());
    }

    async fn run_steps(
        &self,
        state: &mut GenerationState,
        request: &GenerationRequest,
        previous: Option<GeneratedContent>,
        observer: &dyn StateObserver,
    ) -> Result<GeneratedContent, StepFailure> {
        let id = state.id;
        let mut timings = BTreeMap::new();
        let mut fallbacks = Vec::new();
        let mut breakdown = BTreeMap::new();

        let step = GenerationStep::ImageAnalysis;
        let t = Instant::now();
        let insights = self.analyze_images(id, &request.images).await;
        self.finish_step(state, step, t, insights.used_fallback, &mut timings, observer)
            .await?;

        let step = GenerationStep::FeatureExtraction;
        let t = Instant::now();
        let features = self.extract_features(id, request).await.at(step)?;
        self.finish_step(state, step, t, features.used_fallback, &mut timings, observer)
            .await?;
        let features = features.value;

        let step = GenerationStep::CategoryDetection;
        let t = Instant::now();
        let category = self.detect_category(id, &features, request.hint()).await;
        self.track(Aspect::Category, &category, &mut breakdown, &mut fallbacks);
        self.finish_step(state, step, t, category.used_fallback, &mut timings, observer)
            .await?;
        let category = category.value;

        let step = GenerationStep::TitleGeneration;
        let t = Instant::now();
        let title = self.generate_title(id, &features, &category).await;
        self.track(Aspect::Title, &title, &mut breakdown, &mut fallbacks);
        self.finish_step(state, step, t, title.used_fallback, &mut timings, observer)
            .await?;
        let title = title.value;

        let step = GenerationStep::DescriptionGeneration;
        let t = Instant::now();
        let description = self
            .generate_description(id, &features, &title, &category)
            .await;
        self.track(Aspect::Description, &description, &mut breakdown, &mut fallbacks);
        self.finish_step(state, step, t, description.used_fallback, &mut timings, observer)
            .await?;
        let description = description.value;

        let step = GenerationStep::AttributeMapping;
        let t = Instant::now();
        let attributes = self
            .map_attributes(id, &features, &category.category_id)
            .await;
        self.track(Aspect::Attributes, &attributes, &mut breakdown, &mut fallbacks);
        self.finish_step(state, step, t, attributes.used_fallback, &mut timings, observer)
            .await?;
        let attributes = attributes.value;

        let step = GenerationStep::PriceEstimation;
        let t = Instant::now();
        let price = self
            .estimate_price(id, &features, &category.category_id, request.price_range)
            .await;
        self.track(Aspect::Price, &price, &mut breakdown, &mut fallbacks);
        self.finish_step(state, step, t, price.used_fallback, &mut timings, observer)
            .await?;
        let price = price.value;

        let step = GenerationStep::QualityValidation;
        let t = Instant::now();
        let draft = Draft {
            insights: insights.value,
            features,
            category,
            title,
            description,
            attributes,
            price,
            breakdown,
            fallbacks,
        };
        let mut content = self.assemble(request, draft, previous.as_ref()).at(step)?;
        self.finish_step(state, step, t, false, &mut timings, observer)
            .await?;

        let step = GenerationStep::Finalization;
        let t = Instant::now();
        // the save itself is not timed
        content.provider.step_timings_ms = timings.clone();
        if previous.is_some() {
            self.collaborators.repository.update(&content).await.at(step)?;
        } else {
            self.collaborators.repository.save(&content).await.at(step)?;
        }
        self.finish_step(state, step, t, false, &mut timings, observer)
            .await?;
        Ok(content)
    }

    fn track<T>(
        &self,
        aspect: Aspect,
        outcome: &StepOutcome<T>,
        breakdown: &mut BTreeMap<Aspect, f64>,
        fallbacks: &mut Vec<Aspect>,
    ) {
        breakdown.insert(aspect, outcome.confidence);
        if outcome.used_fallback {
            fallbacks.push(aspect);
        }
    }

    async fn analyze_images(&self, id: Uuid, images: &[ProductImage]) -> StepOutcome<ImageInsights> {
        match self.collaborators.ai.analyze_images(images).await {
            Ok(insights) => {
                let quality = insights.quality;
                StepOutcome::produced(insights, quality)
            }
            Err(err) => {
                self.note_fallback(id, GenerationStep::ImageAnalysis, &err);
                StepOutcome::fallback(
                    ImageInsights {
                        image_count: images.len(),
                        usable_images: images.len(),
                        labels: Vec::new(),
                        quality: self.config.fallback_confidence,
                    },
                    self.config.fallback_confidence,
                )
            }
        }
    }

    /// Features are checked here, once; later steps trust them.
    async fn extract_features(
        &self,
        id: Uuid,
        request: &GenerationRequest,
    ) -> Result<StepOutcome<ProductFeatures>, GenerationError> {
        let extracted = self
            .collaborators
            .ai
            .extract_features(&request.images, &request.prompt)
            .await
            .and_then(|mut features| {
                features.prompt = request.prompt.trim().to_string();
                if features.target_audience.is_none() {
                    features.target_audience = request.target_audience.clone();
                }
                features.normalize();
                features
                    .validate()
                    .map(|()| features)
                    .map_err(|errors| CollaboratorError::InvalidOutput(errors.join("; ")))
            });
        match extracted {
            Ok(features) => Ok(StepOutcome::produced(features, 1.0)),
            Err(err) => {
                self.note_fallback(id, GenerationStep::FeatureExtraction, &err);
                let features =
                    ProductFeatures::from_prompt(&request.prompt, request.target_audience.as_deref());
                features
                    .validate()
                    .map_err(|errors| GenerationError::InvalidRequest(errors.join("; ")))?;
                Ok(StepOutcome::fallback(features, self.config.fallback_confidence))
            }
        }
    }

    async fn try_category(
        &self,
        features: &ProductFeatures,
        hint: Option<&str>,
    ) -> Result<CategoryPrediction, CollaboratorError> {
        let prediction = self.collaborators.categories.predict(features, hint).await?;
        let check = self
            .collaborators
            .categories
            .validate(&prediction.category_id, features)
            .await?;
        if check.is_valid {
            Ok(prediction)
        } else {
            Err(CollaboratorError::CategoryDetection(format!(
                "{} rejected: {}",
                prediction.category_id,
                check.errors.join("; ")
            )))
        }
    }

    async fn detect_category(
        &self,
        id: Uuid,
        features: &ProductFeatures,
        hint: Option<&str>,
    ) -> StepOutcome<CategoryPrediction> {
        match self.try_category(features, hint).await {
            Ok(prediction) => {
                let confidence = prediction.confidence;
                StepOutcome::produced(prediction, confidence)
            }
            Err(err) => {
                self.note_fallback(id, GenerationStep::CategoryDetection, &err);
                let (category_id, category_name) = match hint {
                    Some(hint) => (hint.to_string(), hint.to_string()),
                    None => (DEFAULT_CATEGORY_ID.to_string(), DEFAULT_CATEGORY_NAME.to_string()),
                };
                StepOutcome::fallback(
                    CategoryPrediction {
                        category_id,
                        category_name,
                        confidence: self.config.fallback_confidence,
                    },
                    self.config.fallback_confidence,
                )
            }
        }
    }

    async fn try_title(
        &self,
        features: &ProductFeatures,
        category: &CategoryPrediction,
        extra: Option<&str>,
    ) -> Result<(String, f64), CollaboratorError> {
        let titles = &self.collaborators.titles;
        let title = titles.generate(features, category, extra).await?;
        let title = title.trim().to_string();
        let errors = titles.validate(&title);
        if !errors.is_empty() {
            return Err(CollaboratorError::InvalidOutput(errors.join("; ")));
        }
        let confidence = titles.confidence(&title, features);
        Ok((title, confidence))
    }

    async fn generate_title(
        &self,
        id: Uuid,
        features: &ProductFeatures,
        category: &CategoryPrediction,
    ) -> StepOutcome<String> {
        match self.try_title(features, category, None).await {
            Ok((title, confidence)) => StepOutcome::produced(title, confidence),
            Err(err) => {
                self.note_fallback(id, GenerationStep::TitleGeneration, &err);
                StepOutcome::fallback(fallback_title(features), self.config.fallback_confidence)
            }
        }
    }

    async fn try_description(
        &self,
        features: &ProductFeatures,
        title: &str,
        category: &CategoryPrediction,
        extra: Option<&str>,
    ) -> Result<(String, f64), CollaboratorError> {
        let descriptions = &self.collaborators.descriptions;
        let description = descriptions
            .generate(features, title, category, extra)
            .await?;
        let description = description.trim().to_string();
        let errors = descriptions.validate(&description);
        if !errors.is_empty() {
            return Err(CollaboratorError::InvalidOutput(errors.join("; ")));
        }
        let confidence = descriptions.confidence(&description, features);
        Ok((description, confidence))
    }

    async fn generate_description(
        &self,
        id: Uuid,
        features: &ProductFeatures,
        title: &str,
        category: &CategoryPrediction,
    ) -> StepOutcome<String> {
        match self.try_description(features, title, category, None).await {
            Ok((description, confidence)) => StepOutcome::produced(description, confidence),
            Err(err) => {
                self.note_fallback(id, GenerationStep::DescriptionGeneration, &err);
                StepOutcome::fallback(
                    fallback_description(title, features),
                    self.config.fallback_confidence,
                )
            }
        }
    }

    async fn try_attributes(
        &self,
        features: &ProductFeatures,
        category_id: &str,
    ) -> Result<(Vec<ListingAttribute>, f64), CollaboratorError> {
        let mapper = &self.collaborators.attributes;
        let attributes = mapper.generate(features, category_id).await?;
        let errors = mapper.validate(&attributes, category_id);
        if !errors.is_empty() {
            return Err(CollaboratorError::InvalidOutput(errors.join("; ")));
        }
        let confidence = mapper.confidence(&attributes, features);
        Ok((attributes, confidence))
    }

    async fn map_attributes(
        &self,
        id: Uuid,
        features: &ProductFeatures,
        category_id: &str,
    ) -> StepOutcome<Vec<ListingAttribute>> {
        match self.try_attributes(features, category_id).await {
            Ok((attributes, confidence)) => StepOutcome::produced(attributes, confidence),
            Err(err) => {
                self.note_fallback(id, GenerationStep::AttributeMapping, &err);
                StepOutcome::fallback(fallback_attributes(features), self.config.fallback_confidence)
            }
        }
    }

    async fn try_price(
        &self,
        features: &ProductFeatures,
        category_id: &str,
        range: Option<PriceRange>,
    ) -> Result<(Price, f64), CollaboratorError> {
        let estimate = self
            .collaborators
            .ai
            .estimate_price(features, category_id)
            .await?;
        if !(estimate.amount.is_finite() && estimate.amount > 0.0) {
            return Err(CollaboratorError::InvalidOutput(format!(
                "price estimate {} is not positive",
                estimate.amount
            )));
        }
        let amount = range.map_or(estimate.amount, |r| r.clamp(estimate.amount));
        let currency = estimate
            .currency
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.config.default_currency.clone());
        Ok((Price::new(amount, currency), estimate.confidence))
    }

    async fn estimate_price(
        &self,
        id: Uuid,
        features: &ProductFeatures,
        category_id: &str,
        range: Option<PriceRange>,
    ) -> StepOutcome<Price> {
        match self.try_price(features, category_id, range).await {
            Ok((price, confidence)) => StepOutcome::produced(price, confidence),
            Err(err) => {
                self.note_fallback(id, GenerationStep::PriceEstimation, &err);
                let amount = range.map_or(FALLBACK_PRICE, |r| r.midpoint());
                StepOutcome::fallback(
                    Price::new(amount, self.config.default_currency.clone()),
                    self.config.fallback_confidence,
                )
            }
        }
    }

    /// Builds the listing, enforces structure and attaches the compliance and
    /// quality verdict. Only structure can fail the run.
    fn assemble(
        &self,
        request: &GenerationRequest,
        draft: Draft,
        previous: Option<&GeneratedContent>,
    ) -> Result<GeneratedContent, GenerationError> {
        let confidence = ConfidenceScore::from_breakdown(draft.breakdown)?;
        let condition = draft.features.condition.unwrap_or_default();
        let now = Utc::now();
        let mut content = GeneratedContent {
            id: previous.map_or_else(Uuid::new_v4, |p| p.id),
            product_id: request.product_id.clone(),
            title: draft.title,
            description: draft.description,
            category_id: draft.category.category_id,
            category_name: draft.category.category_name,
            price: draft.price,
            quantity: 1,
            buying_mode: BuyingMode::BuyItNow,
            condition,
            listing_type: ListingType::GoldSpecial,
            attributes: draft.attributes,
            sale_terms: vec![warranty_term(condition)],
            shipping: ShippingInfo::default(),
            confidence,
            provider: ProviderMetadata {
                provider: self.config.provider_label.clone(),
                fallback_aspects: draft.fallbacks,
                step_timings_ms: BTreeMap::new(),
                prompt: request.prompt.trim().to_string(),
            },
            features: draft.features,
            images: request.images.clone(),
            validation: None,
            version: previous.map_or(1, |p| p.version + 1),
            created_at: previous.map_or(now, |p| p.created_at),
            updated_at: now,
        };

        let errors = content.structural_errors();
        if !errors.is_empty() {
            return Err(GenerationError::StructuralValidation(errors));
        }

        let fallback_notes: Vec<String> = content
            .provider
            .fallback_aspects
            .iter()
            .map(|aspect| format!("{aspect} was filled in by a fallback"))
            .collect();
        let outcome = self.validator.validate(&content).with_warnings(fallback_notes);
        if !outcome.is_compliant() {
            info!(
                target = "hermes.generation",
                product_id = %content.product_id,
                violations = outcome.violations.len(),
                "compliance_findings_attached"
            );
        }
        if !outcome.meets_quality_threshold {
            warn!(
                target = "hermes.generation",
                product_id = %content.product_id,
                quality = outcome.quality_score,
                threshold = self.validator.quality_threshold(),
                "quality_below_threshold"
            );
        }
        debug!(
            target = "hermes.generation",
            usable_images = draft.insights.usable_images,
            image_quality = draft.insights.quality,
            "image_insights"
        );
        content.validation = Some(outcome);
        Ok(content)
    }

    async fn load(&self, content_id: Uuid) -> Result<GeneratedContent, GenerationError> {
        self.collaborators
            .repository
            .get_by_id(content_id)
            .await?
            .ok_or_else(|| GenerationError::not_found("content", content_id))
    }

    /// Regenerates one aspect of stored content and saves it as a new version.
    /// `extra` is free-form guidance for text aspects and the category hint
    /// for the category aspect.
    pub async fn enhance_content(
        &self,
        content_id: Uuid,
        aspect: Aspect,
        extra: Option<&str>,
    ) -> Result<GeneratedContent, GenerationError> {
        let current = self.load(content_id).await?;
        let features = &current.features;
        let category = CategoryPrediction {
            category_id: current.category_id.clone(),
            category_name: current.category_name.clone(),
            confidence: current
                .confidence
                .component(Aspect::Category)
                .unwrap_or(self.config.fallback_confidence),
        };
        let mut next = current.clone();

        let confidence = match aspect {
            Aspect::Title => {
                let (title, confidence) = self.try_title(features, &category, extra).await?;
                next.title = title;
                confidence
            }
            Aspect::Description => {
                let (description, confidence) = self
                    .try_description(features, &current.title, &category, extra)
                    .await?;
                next.description = description;
                confidence
            }
            Aspect::Category => {
                let prediction = self.try_category(features, extra).await?;
                next.category_id = prediction.category_id;
                next.category_name = prediction.category_name;
                prediction.confidence
            }
            Aspect::Price => {
                let (price, confidence) = self
                    .try_price(features, &current.category_id, None)
                    .await?;
                next.price = price;
                confidence
            }
            Aspect::Attributes => {
                let (attributes, confidence) =
                    self.try_attributes(features, &current.category_id).await?;
                next.attributes = attributes;
                confidence
            }
        };

        next.confidence = current
            .confidence
            .with_component(aspect, confidence.clamp(0.0, 1.0))?;
        next.provider.fallback_aspects.retain(|a| *a != aspect);
        next.version = current.version + 1;
        next.updated_at = Utc::now();

        let errors = next.structural_errors();
        if !errors.is_empty() {
            return Err(GenerationError::StructuralValidation(errors));
        }
        next.validation = Some(self.validator.validate(&next));
        self.collaborators.repository.update(&next).await?;
        info!(
            target = "hermes.generation",
            %content_id,
            aspect = aspect.as_str(),
            version = next.version,
            overall_confidence = next.overall_confidence(),
            "content_enhanced"
        );
        Ok(next)
    }

    /// Read-only: nothing is written back.
    pub async fn validate_generated_content(
        &self,
        content_id: Uuid,
    ) -> Result<ValidationReport, GenerationError> {
        let content = self.load(content_id).await?;
        let outcome = self.validator.validate(&content);
        let weighted = content
            .confidence
            .weighted_score(&default_aspect_weights())
            .unwrap_or_else(|_| content.overall_confidence());
        Ok(ValidationReport {
            content_id,
            version: content.version,
            compliance: self.validator.check_compliance(&content),
            quality: self.validator.calculate_quality_score(&content),
            suggestions: self.validator.improvement_suggestions(&content),
            confidence: ConfidenceReport {
                overall: content.overall_confidence(),
                weighted,
                is_high_confidence: content.confidence.is_high_confidence(HIGH_CONFIDENCE_THRESHOLD),
                weak_components: content.confidence.weak_components(WEAK_COMPONENT_THRESHOLD),
            },
            outcome,
        })
    }

    pub async fn list_versions(&self, content_id: Uuid) -> Result<Vec<ContentSummary>, GenerationError> {
        let versions = self.collaborators.repository.list_versions(content_id).await?;
        if versions.is_empty() {
            return Err(GenerationError::not_found("content", content_id));
        }
        Ok(versions.iter().map(GeneratedContent::summary).collect())
    }
}

fn fallback_title(features: &ProductFeatures) -> String {
    let base = truncate_title(&features.prompt);
    if base.chars().count() >= TITLE_MIN_CHARS {
        base
    } else if base.is_empty() {
        "Producto en venta".to_string()
    } else {
        truncate_title(&format!("{base} - Producto"))
    }
}

fn fallback_description(title: &str, features: &ProductFeatures) -> String {
    let mut text = format!("{}\n\nCaracterísticas:\n", title.trim_end_matches('.'));
    let mut bullets = Vec::new();
    if let Some(kind) = &features.product_type {
        bullets.push(format!("Producto: {kind}"));
    }
    if let Some(brand) = &features.brand {
        bullets.push(format!("Marca: {brand}"));
    }
    for (key, value) in &features.specs {
        bullets.push(format!("{key}: {value}"));
    }
    if let Some(condition) = features.condition {
        bullets.push(format!("Condición: {}", condition.label()));
    }
    if bullets.is_empty() {
        bullets.push("Ver fotos para más detalles".to_string());
    }
    for bullet in bullets {
        text.push_str(&format!("- {bullet}\n"));
    }
    text.push_str("\nDescripción generada automáticamente. Revisá los datos antes de publicar.");
    text
}

fn fallback_attributes(features: &ProductFeatures) -> Vec<ListingAttribute> {
    let mut attributes = Vec::new();
    if let Some(brand) = &features.brand {
        attributes.push(ListingAttribute::new("BRAND", "Marca", brand.clone()));
    }
    if let Some(condition) = features.condition {
        attributes.push(ListingAttribute::new(
            "ITEM_CONDITION",
            "Condición",
            condition.label(),
        ));
    }
    attributes
}

fn warranty_term(condition: ItemCondition) -> SaleTerm {
    let value_name = match condition {
        ItemCondition::New => "Garantía del vendedor",
        ItemCondition::Used | ItemCondition::Refurbished => "Sin garantía",
    };
    SaleTerm {
        id: "WARRANTY_TYPE".into(),
        value_name: value_name.into(),
    }
}
