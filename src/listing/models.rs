use super::confidence::{Aspect, ConfidenceScore};
use super::features::ProductFeatures;
use crate::compliance::ValidationOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;
use uuid::Uuid;

pub const TITLE_MIN_CHARS: usize = 10;
pub const TITLE_MAX_CHARS: usize = 60;
pub const DESCRIPTION_MIN_CHARS: usize = 50;
pub const DESCRIPTION_MAX_CHARS: usize = 50_000;
/// Smallest amount that survives rounding to cents.
pub const MIN_PRICE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductImage {
    pub key: String,
    pub url: String,
    pub format: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn clamp(&self, amount: f64) -> f64 {
        amount.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub amount: f64,
    pub currency: String,
}

impl Price {
    /// Rounded to cents.
    pub fn new(amount: f64, currency: impl Into<String>) -> Self {
        Self {
            amount: (amount * 100.0).round() / 100.0,
            currency: currency.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyingMode {
    #[default]
    BuyItNow,
    Auction,
    Classified,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    #[default]
    New,
    Used,
    Refurbished,
}

impl ItemCondition {
    pub fn label(&self) -> &'static str {
        match self {
            ItemCondition::New => "Nuevo",
            ItemCondition::Used => "Usado",
            ItemCondition::Refurbished => "Reacondicionado",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingType {
    #[default]
    GoldSpecial,
    GoldPro,
    Free,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingAttribute {
    pub id: String,
    pub name: String,
    pub value_name: String,
    pub value_id: Option<String>,
}

impl ListingAttribute {
    pub fn new(id: &str, name: &str, value: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            value_name: value.into(),
            value_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleTerm {
    pub id: String,
    pub value_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub mode: String,
    pub free_shipping: bool,
    pub local_pick_up: bool,
}

impl Default for ShippingInfo {
    fn default() -> Self {
        Self {
            mode: "me2".into(),
            free_shipping: false,
            local_pick_up: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub provider: String,
    #[serde(default)]
    pub fallback_aspects: Vec<Aspect>,
    #[serde(default)]
    pub step_timings_ms: BTreeMap<String, u64>,
    #[serde(default)]
    pub prompt: String,
}

/// Marketplace listing artifact produced by one generation run.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub id: Uuid,
    pub product_id: String,
    pub title: String,
    pub description: String,
    pub category_id: String,
    pub category_name: String,
    pub price: Price,
    pub quantity: u32,
    pub buying_mode: BuyingMode,
    pub condition: ItemCondition,
    pub listing_type: ListingType,
    #[serde(default)]
    pub attributes: Vec<ListingAttribute>,
    #[serde(default)]
    pub sale_terms: Vec<SaleTerm>,
    #[serde(default)]
    pub shipping: ShippingInfo,
    pub confidence: ConfidenceScore,
    #[serde(default)]
    pub provider: ProviderMetadata,
    #[serde(default)]
    pub features: ProductFeatures,
    #[serde(default)]
    pub images: Vec<ProductImage>,
    pub validation: Option<ValidationOutcome>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GeneratedContent {
    pub fn overall_confidence(&self) -> f64 {
        self.confidence.overall()
    }

    /// Shape/length/value violations. Non-empty means the content cannot be stored.
    pub fn structural_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(title_length_error(&self.title));
        errors.extend(description_length_error(&self.description));
        if self.category_id.trim().is_empty() {
            errors.push("category is required".to_string());
        }
        if !(self.price.amount.is_finite() && self.price.amount > 0.0) {
            errors.push(format!("price must be positive (got {})", self.price.amount));
        }
        if self.price.currency.trim().is_empty() {
            errors.push("currency is required".to_string());
        }
        if self.quantity == 0 {
            errors.push("quantity must be positive".to_string());
        }
        for (aspect, value) in self.confidence.breakdown() {
            if !(0.0..=1.0).contains(value) {
                errors.push(format!("confidence for {aspect} is outside [0, 1]"));
            }
        }
        errors
    }

    pub fn summary(&self) -> ContentSummary {
        ContentSummary {
            content_id: self.id,
            title: self.title.clone(),
            category_id: self.category_id.clone(),
            category_name: self.category_name.clone(),
            price: self.price.amount,
            currency: self.price.currency.clone(),
            overall_confidence: self.overall_confidence(),
            version: self.version,
        }
    }
}

/// Compact view pushed on the progress channel at completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSummary {
    pub content_id: Uuid,
    pub title: String,
    pub category_id: String,
    pub category_name: String,
    pub price: f64,
    pub currency: String,
    pub overall_confidence: f64,
    pub version: u32,
}

pub fn title_length_error(title: &str) -> Option<String> {
    let len = title.trim().chars().count();
    if len < TITLE_MIN_CHARS {
        Some(format!(
            "title length {len} is below the minimum of {TITLE_MIN_CHARS} characters"
        ))
    } else if len > TITLE_MAX_CHARS {
        Some(format!(
            "title length {len} exceeds the maximum of {TITLE_MAX_CHARS} characters"
        ))
    } else {
        None
    }
}

/// Cuts `text` to the title limit, backing off to the last whole word.
pub fn truncate_title(text: &str) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().count() <= TITLE_MAX_CHARS {
        return text;
    }
    let cut: String = text.chars().take(TITLE_MAX_CHARS).collect();
    match cut.rfind(' ') {
        Some(pos) if pos > 0 => cut[..pos].trim_end().to_string(),
        _ => cut,
    }
}

pub fn description_length_error(description: &str) -> Option<String> {
    let len = description.trim().chars().count();
    if len < DESCRIPTION_MIN_CHARS {
        Some(format!(
            "description length {len} is below the minimum of {DESCRIPTION_MIN_CHARS} characters"
        ))
    } else if len > DESCRIPTION_MAX_CHARS {
        Some(format!(
            "description length {len} exceeds the maximum of {DESCRIPTION_MAX_CHARS} characters"
        ))
    } else {
        None
    }
}
