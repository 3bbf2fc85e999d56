use super::models::ItemCondition;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::{BTreeMap, HashSet};

pub const MAX_SPEC_ENTRIES: usize = 24;
pub const MAX_SPEC_KEY_CHARS: usize = 48;
pub const MAX_SPEC_VALUE_CHARS: usize = 200;
pub const MAX_KEYWORDS: usize = 16;

const STOPWORDS: &[&str] = &[
    "de", "del", "la", "las", "el", "los", "con", "para", "por", "sin", "una", "uno", "un", "y",
    "en", "the", "and", "for", "with",
];

/// Structured product signal shared by every generation step.
///
/// Named fields cover what the collaborators understand; anything else goes in
/// the bounded `specs` map.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductFeatures {
    pub product_type: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    pub material: Option<String>,
    pub size: Option<String>,
    pub condition: Option<ItemCondition>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub specs: BTreeMap<String, String>,
    #[serde(default)]
    pub prompt: String,
    pub target_audience: Option<String>,
}

impl ProductFeatures {
    /// Deterministic extraction from the seller prompt alone.
    pub fn from_prompt(prompt: &str, target_audience: Option<&str>) -> Self {
        let words: Vec<&str> = prompt
            .split(|ch: char| ch.is_whitespace() || matches!(ch, ',' | ';' | '.'))
            .filter(|w| !w.is_empty())
            .collect();
        let lowered: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();

        let condition = if lowered
            .iter()
            .any(|w| matches!(w.as_str(), "usado" | "usada" | "used" | "usados" | "usadas"))
        {
            Some(ItemCondition::Used)
        } else if lowered
            .iter()
            .any(|w| matches!(w.as_str(), "nuevo" | "nueva" | "new" | "nuevos" | "nuevas"))
        {
            Some(ItemCondition::New)
        } else if lowered.iter().any(|w| w.starts_with("reacondicionad")) {
            Some(ItemCondition::Refurbished)
        } else {
            None
        };

        let mut specs = BTreeMap::new();
        for pair in lowered.windows(2) {
            let (label, value) = (&pair[0], &pair[1]);
            if value.chars().next().is_some_and(|c| c.is_ascii_digit())
                && label.chars().all(char::is_alphabetic)
                && !STOPWORDS.contains(&label.as_str())
            {
                specs.insert(label.clone(), value.clone());
            }
        }

        let keywords = lowered
            .iter()
            .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(&w.as_str()))
            .cloned()
            .collect();

        let mut features = Self {
            product_type: words.first().map(|w| capitalize(w)),
            condition,
            keywords,
            specs,
            prompt: prompt.trim().to_string(),
            target_audience: target_audience.map(str::to_string),
            ..Self::default()
        };
        features.normalize();
        features
    }

    /// Trims values, drops blanks and duplicates, and enforces the size bounds.
    pub fn normalize(&mut self) {
        for field in [
            &mut self.product_type,
            &mut self.brand,
            &mut self.model,
            &mut self.color,
            &mut self.material,
            &mut self.size,
            &mut self.target_audience,
        ] {
            *field = field
                .take()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
        }
        self.prompt = self.prompt.trim().to_string();

        let mut seen = HashSet::new();
        self.keywords = std::mem::take(&mut self.keywords)
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty() && seen.insert(k.clone()))
            .take(MAX_KEYWORDS)
            .collect();

        self.specs = std::mem::take(&mut self.specs)
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
            .filter(|(k, v)| {
                !k.is_empty()
                    && !v.is_empty()
                    && k.chars().count() <= MAX_SPEC_KEY_CHARS
                    && v.chars().count() <= MAX_SPEC_VALUE_CHARS
            })
            .take(MAX_SPEC_ENTRIES)
            .collect();
    }

    /// Entry check run once, right after extraction.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.prompt.trim().is_empty() {
            errors.push("features must carry the seller prompt".to_string());
        }
        if self.product_type.is_none() && self.keywords.is_empty() {
            errors.push("features must name a product type or at least one keyword".to_string());
        }
        if self.specs.len() > MAX_SPEC_ENTRIES {
            errors.push(format!("too many spec entries (max {MAX_SPEC_ENTRIES})"));
        }
        if self.keywords.len() > MAX_KEYWORDS {
            errors.push(format!("too many keywords (max {MAX_KEYWORDS})"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Product type, brand and model joined, skipping missing parts.
    pub fn headline(&self) -> String {
        [&self.product_type, &self.brand, &self.model]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of the image analysis step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageInsights {
    pub image_count: usize,
    pub usable_images: usize,
    #[serde(default)]
    pub labels: Vec<String>,
    /// 0..=1 estimate of how well the photos support a listing.
    pub quality: f64,
}

/// Uppercases the first character only.
pub(crate) fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
