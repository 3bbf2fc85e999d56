use serde::{Deserialize, Serialize};
use std::fmt;

pub const TOTAL_STEPS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStep {
    ImageAnalysis,
    FeatureExtraction,
    CategoryDetection,
    TitleGeneration,
    DescriptionGeneration,
    AttributeMapping,
    PriceEstimation,
    QualityValidation,
    Finalization,
}

impl GenerationStep {
    pub const ALL: [GenerationStep; TOTAL_STEPS] = [
        GenerationStep::ImageAnalysis,
        GenerationStep::FeatureExtraction,
        GenerationStep::CategoryDetection,
        GenerationStep::TitleGeneration,
        GenerationStep::DescriptionGeneration,
        GenerationStep::AttributeMapping,
        GenerationStep::PriceEstimation,
        GenerationStep::QualityValidation,
        GenerationStep::Finalization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStep::ImageAnalysis => "image_analysis",
            GenerationStep::FeatureExtraction => "feature_extraction",
            GenerationStep::CategoryDetection => "category_detection",
            GenerationStep::TitleGeneration => "title_generation",
            GenerationStep::DescriptionGeneration => "description_generation",
            GenerationStep::AttributeMapping => "attribute_mapping",
            GenerationStep::PriceEstimation => "price_estimation",
            GenerationStep::QualityValidation => "quality_validation",
            GenerationStep::Finalization => "finalization",
        }
    }

    /// Percentage emitted once this step has finished.
    pub fn milestone(&self) -> f64 {
        match self {
            GenerationStep::ImageAnalysis => 10.0,
            GenerationStep::FeatureExtraction => 20.0,
            GenerationStep::CategoryDetection => 35.0,
            GenerationStep::TitleGeneration => 50.0,
            GenerationStep::DescriptionGeneration => 65.0,
            GenerationStep::AttributeMapping => 75.0,
            GenerationStep::PriceEstimation => 80.0,
            GenerationStep::QualityValidation => 90.0,
            GenerationStep::Finalization => 95.0,
        }
    }

    /// Importance weight; the nine weights sum to 100. Reporting only.
    pub fn weight(&self) -> f64 {
        match self {
            GenerationStep::ImageAnalysis => 15.0,
            GenerationStep::FeatureExtraction => 10.0,
            GenerationStep::CategoryDetection => 15.0,
            GenerationStep::TitleGeneration => 15.0,
            GenerationStep::DescriptionGeneration => 15.0,
            GenerationStep::AttributeMapping => 10.0,
            GenerationStep::PriceEstimation => 5.0,
            GenerationStep::QualityValidation => 10.0,
            GenerationStep::Finalization => 5.0,
        }
    }

    /// 1-based position in the pipeline.
    pub fn ordinal(&self) -> usize {
        *self as usize + 1
    }
}

impl fmt::Display for GenerationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one pipeline step produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome<T> {
    pub value: T,
    pub confidence: f64,
    pub used_fallback: bool,
}

impl<T> StepOutcome<T> {
    pub fn produced(value: T, confidence: f64) -> Self {
        Self {
            value,
            confidence: confidence.clamp(0.0, 1.0),
            used_fallback: false,
        }
    }

    pub fn fallback(value: T, confidence: f64) -> Self {
        Self {
            value,
            confidence: confidence.clamp(0.0, 1.0),
            used_fallback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one_hundred() {
        let total: f64 = GenerationStep::ALL.iter().map(GenerationStep::weight).sum();
        assert_eq!(total, 100.0);
    }

    #[test]
    fn milestones_increase_and_stop_short_of_completion() {
        let milestones: Vec<f64> = GenerationStep::ALL.iter().map(GenerationStep::milestone).collect();
        assert!(milestones.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(milestones.last(), Some(&95.0));
    }

    #[test]
    fn ordinals_follow_pipeline_order() {
        assert_eq!(GenerationStep::ImageAnalysis.ordinal(), 1);
        assert_eq!(GenerationStep::Finalization.ordinal(), TOTAL_STEPS);
    }

    #[test]
    fn outcome_clamps_confidence() {
        let outcome = StepOutcome::produced("x", 1.4);
        assert_eq!(outcome.confidence, 1.0);
        assert!(StepOutcome::fallback((), 0.3).used_fallback);
    }
}
