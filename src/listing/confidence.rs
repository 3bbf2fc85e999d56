use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error;

pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.8;
pub const WEAK_COMPONENT_THRESHOLD: f64 = 0.6;

/// One scored dimension of generated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aspect {
    Title,
    Description,
    Category,
    Price,
    Attributes,
}

impl Aspect {
    pub const ALL: [Aspect; 5] = [
        Aspect::Title,
        Aspect::Description,
        Aspect::Category,
        Aspect::Price,
        Aspect::Attributes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Aspect::Title => "title",
            Aspect::Description => "description",
            Aspect::Category => "category",
            Aspect::Price => "price",
            Aspect::Attributes => "attributes",
        }
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aspect {
    type Err = ConfidenceError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "title" => Ok(Aspect::Title),
            "description" => Ok(Aspect::Description),
            "category" => Ok(Aspect::Category),
            "price" => Ok(Aspect::Price),
            "attributes" => Ok(Aspect::Attributes),
            other => Err(ConfidenceError::UnknownAspect(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfidenceError {
    #[error("confidence breakdown is empty")]
    Empty,
    #[error("confidence for `{aspect}` is outside [0, 1]: {value}")]
    OutOfRange { aspect: String, value: f64 },
    #[error("unknown aspect `{0}`")]
    UnknownAspect(String),
    #[error("weights must be non-negative and not all zero")]
    InvalidWeights,
}

fn check_unit(aspect: impl fmt::Display, value: f64) -> Result<f64, ConfidenceError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfidenceError::OutOfRange {
            aspect: aspect.to_string(),
            value,
        })
    }
}

pub struct ConfidenceAggregator;

impl ConfidenceAggregator {
    /// Arithmetic mean of the breakdown. Every input and the result must be in [0, 1].
    pub fn aggregate(breakdown: &BTreeMap<Aspect, f64>) -> Result<f64, ConfidenceError> {
        if breakdown.is_empty() {
            return Err(ConfidenceError::Empty);
        }
        let mut sum = 0.0;
        for (aspect, value) in breakdown {
            sum += check_unit(aspect, *value)?;
        }
        check_unit("overall", sum / breakdown.len() as f64)
    }

    /// Importance-weighted mean over the aspects present in both maps.
    ///
    /// Reporting only; `aggregate` is the overall used by the pipeline.
    pub fn weighted(
        breakdown: &BTreeMap<Aspect, f64>,
        weights: &BTreeMap<Aspect, f64>,
    ) -> Result<f64, ConfidenceError> {
        let mut total_weight = 0.0;
        let mut acc = 0.0;
        for (aspect, value) in breakdown {
            let Some(weight) = weights.get(aspect) else {
                continue;
            };
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfidenceError::InvalidWeights);
            }
            acc += check_unit(aspect, *value)? * weight;
            total_weight += weight;
        }
        if total_weight <= 0.0 {
            return Err(ConfidenceError::InvalidWeights);
        }
        check_unit("weighted", acc / total_weight)
    }
}

/// Reporting weights per aspect; they sum to 1.
pub fn default_aspect_weights() -> BTreeMap<Aspect, f64> {
    BTreeMap::from([
        (Aspect::Title, 0.25),
        (Aspect::Description, 0.20),
        (Aspect::Category, 0.25),
        (Aspect::Price, 0.15),
        (Aspect::Attributes, 0.15),
    ])
}

/// Overall confidence plus the per-aspect breakdown it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawConfidence")]
pub struct ConfidenceScore {
    overall: f64,
    breakdown: BTreeMap<Aspect, f64>,
}

#[derive(Deserialize)]
struct RawConfidence {
    breakdown: BTreeMap<Aspect, f64>,
}

impl TryFrom<RawConfidence> for ConfidenceScore {
    type Error = ConfidenceError;

    fn try_from(raw: RawConfidence) -> Result<Self, Self::Error> {
        Self::from_breakdown(raw.breakdown)
    }
}

impl ConfidenceScore {
    pub fn from_breakdown(breakdown: BTreeMap<Aspect, f64>) -> Result<Self, ConfidenceError> {
        let overall = ConfidenceAggregator::aggregate(&breakdown)?;
        Ok(Self { overall, breakdown })
    }

    pub fn overall(&self) -> f64 {
        self.overall
    }

    pub fn breakdown(&self) -> &BTreeMap<Aspect, f64> {
        &self.breakdown
    }

    pub fn component(&self, aspect: Aspect) -> Option<f64> {
        self.breakdown.get(&aspect).copied()
    }

    /// New score with one component replaced and the overall recomputed.
    pub fn with_component(&self, aspect: Aspect, value: f64) -> Result<Self, ConfidenceError> {
        let mut breakdown = self.breakdown.clone();
        breakdown.insert(aspect, check_unit(aspect, value)?);
        Self::from_breakdown(breakdown)
    }

    pub fn is_high_confidence(&self, threshold: f64) -> bool {
        self.overall >= threshold
    }

    pub fn weak_components(&self, threshold: f64) -> Vec<Aspect> {
        self.breakdown
            .iter()
            .filter(|(_, value)| **value < threshold)
            .map(|(aspect, _)| *aspect)
            .collect()
    }

    pub fn weighted_score(&self, weights: &BTreeMap<Aspect, f64>) -> Result<f64, ConfidenceError> {
        ConfidenceAggregator::weighted(&self.breakdown, weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakdown(values: &[(Aspect, f64)]) -> BTreeMap<Aspect, f64> {
        values.iter().copied().collect()
    }

    #[test]
    fn aggregate_is_exact_mean() {
        let cases = [
            vec![(Aspect::Title, 0.9)],
            vec![(Aspect::Title, 0.2), (Aspect::Price, 0.7)],
            vec![
                (Aspect::Title, 0.91),
                (Aspect::Description, 0.83),
                (Aspect::Category, 0.77),
                (Aspect::Price, 0.64),
                (Aspect::Attributes, 0.58),
            ],
            vec![(Aspect::Category, 0.0), (Aspect::Attributes, 1.0)],
        ];
        for case in cases {
            let map = breakdown(&case);
            let expected = case.iter().map(|(_, v)| v).sum::<f64>() / case.len() as f64;
            let overall = ConfidenceAggregator::aggregate(&map).expect("valid");
            assert!((overall - expected).abs() < 1e-12);
            assert!((0.0..=1.0).contains(&overall));
        }
    }

    #[test]
    fn aggregate_rejects_empty_and_out_of_range() {
        assert_eq!(
            ConfidenceAggregator::aggregate(&BTreeMap::new()),
            Err(ConfidenceError::Empty)
        );
        let err = ConfidenceAggregator::aggregate(&breakdown(&[(Aspect::Price, 1.2)]))
            .expect_err("out of range");
        assert!(matches!(err, ConfidenceError::OutOfRange { .. }));
        assert!(ConfidenceAggregator::aggregate(&breakdown(&[(Aspect::Price, f64::NAN)])).is_err());
    }

    #[test]
    fn with_component_recomputes_overall() {
        let score = ConfidenceScore::from_breakdown(breakdown(&[
            (Aspect::Title, 0.3),
            (Aspect::Description, 0.9),
        ]))
        .unwrap();
        assert!((score.overall() - 0.6).abs() < 1e-12);
        let updated = score.with_component(Aspect::Title, 0.9).unwrap();
        assert!((updated.overall() - 0.9).abs() < 1e-12);
        // the original is untouched
        assert_eq!(score.component(Aspect::Title), Some(0.3));
    }

    #[test]
    fn thresholds_and_weak_components() {
        let score = ConfidenceScore::from_breakdown(breakdown(&[
            (Aspect::Title, 0.95),
            (Aspect::Category, 0.5),
            (Aspect::Price, 0.59),
        ]))
        .unwrap();
        assert!(!score.is_high_confidence(HIGH_CONFIDENCE_THRESHOLD));
        assert_eq!(
            score.weak_components(WEAK_COMPONENT_THRESHOLD),
            vec![Aspect::Category, Aspect::Price]
        );
    }

    #[test]
    fn weighted_score_differs_from_mean() {
        let score = ConfidenceScore::from_breakdown(breakdown(&[
            (Aspect::Title, 1.0),
            (Aspect::Price, 0.0),
        ]))
        .unwrap();
        let weights = breakdown(&[(Aspect::Title, 3.0), (Aspect::Price, 1.0)]);
        assert!((score.weighted_score(&weights).unwrap() - 0.75).abs() < 1e-12);
        assert!((score.overall() - 0.5).abs() < 1e-12);
        assert_eq!(
            score.weighted_score(&BTreeMap::new()),
            Err(ConfidenceError::InvalidWeights)
        );
    }

    #[test]
    fn deserialization_recomputes_overall() {
        let json = r#"{"overall": 0.1, "breakdown": {"title": 0.8, "price": 0.6}}"#;
        let score: ConfidenceScore = serde_json::from_str(json).unwrap();
        assert!((score.overall() - 0.7).abs() < 1e-12);
        let bad = r#"{"overall": 0.5, "breakdown": {"title": 2.0}}"#;
        assert!(serde_json::from_str::<ConfidenceScore>(bad).is_err());
    }

    #[test]
    fn aspect_parses_case_insensitively() {
        assert_eq!("Title".parse::<Aspect>().unwrap(), Aspect::Title);
        assert!("shipping".parse::<Aspect>().is_err());
    }
}
