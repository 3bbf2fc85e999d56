use crate::listing::GeneratedContent;
use crate::listing::models::{description_length_error, title_length_error};
use serde::{Deserialize, Serialize};

pub const COMPLETENESS_WEIGHT: f64 = 0.25;
pub const READABILITY_WEIGHT: f64 = 0.20;
pub const COMPLIANCE_WEIGHT: f64 = 0.25;
pub const SEO_WEIGHT: f64 = 0.15;
pub const MOBILE_WEIGHT: f64 = 0.15;

const SENTENCE_WORDS: std::ops::RangeInclusive<f64> = 10.0..=20.0;
const PARAGRAPHS: std::ops::RangeInclusive<usize> = 2..=6;
const MOBILE_LINE_CHARS: usize = 80;
const MOBILE_PARAGRAPH_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityBreakdown {
    pub overall: f64,
    pub completeness: f64,
    pub readability: f64,
    pub compliance: f64,
    pub seo: f64,
    pub mobile: f64,
}

/// Weighted quality score; `violation_count` comes from the compliance scan.
pub fn score(content: &GeneratedContent, violation_count: usize) -> QualityBreakdown {
    let completeness = completeness(content);
    let mobile = mobile_friendliness(&content.description);
    let readability = readability(&content.description, mobile);
    let compliance = compliance(content, violation_count);
    let seo = seo(content);
    let overall = (completeness * COMPLETENESS_WEIGHT
        + readability * READABILITY_WEIGHT
        + compliance * COMPLIANCE_WEIGHT
        + seo * SEO_WEIGHT
        + mobile * MOBILE_WEIGHT)
        .clamp(0.0, 1.0);
    QualityBreakdown {
        overall,
        completeness,
        readability,
        compliance,
        seo,
        mobile,
    }
}

fn completeness(content: &GeneratedContent) -> f64 {
    let present = [
        !content.title.trim().is_empty(),
        !content.description.trim().is_empty(),
        !content.category_id.trim().is_empty(),
        content.price.amount > 0.0,
    ];
    present.iter().filter(|p| **p).count() as f64 / present.len() as f64
}

fn readability(description: &str, mobile: f64) -> f64 {
    let sentence = match average_sentence_words(description) {
        Some(avg) if SENTENCE_WORDS.contains(&avg) => 1.0,
        Some(avg) if (5.0..=25.0).contains(&avg) => 0.5,
        _ => 0.0,
    };
    let paragraph = match paragraphs(description).len() {
        0 => 0.0,
        n if PARAGRAPHS.contains(&n) => 1.0,
        _ => 0.5,
    };
    0.4 * sentence + 0.3 * paragraph + 0.3 * mobile
}

fn compliance(content: &GeneratedContent, violation_count: usize) -> f64 {
    let mut value = 1.0;
    if title_length_error(&content.title).is_some() {
        value -= 0.25;
    }
    if description_length_error(&content.description).is_some() {
        value -= 0.25;
    }
    value -= 0.2 * violation_count as f64;
    value.max(0.0)
}

fn seo(content: &GeneratedContent) -> f64 {
    let mut value = 0.0;
    if has_numeric_token(&content.title) {
        value += 0.4;
    }
    if has_bullets(&content.description) {
        value += 0.3;
    }
    if content.attributes.len() >= 3 {
        value += 0.3;
    }
    value
}

pub fn mobile_friendliness(description: &str) -> f64 {
    let lines: Vec<&str> = description.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return 0.0;
    }
    let long_lines = lines
        .iter()
        .filter(|l| l.chars().count() > MOBILE_LINE_CHARS)
        .count();
    let paras = paragraphs(description);
    let long_paras = paras
        .iter()
        .filter(|p| p.chars().count() > MOBILE_PARAGRAPH_CHARS)
        .count();

    let mut value = 0.0;
    if long_lines as f64 / lines.len() as f64 <= 0.3 {
        value += 0.5;
    }
    if paras.is_empty() || long_paras as f64 / paras.len() as f64 <= 0.5 {
        value += 0.5;
    }
    value
}

pub fn paragraphs(text: &str) -> Vec<&str> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

pub fn has_bullets(text: &str) -> bool {
    text.lines().any(is_bullet_line)
}

pub fn has_numeric_token(text: &str) -> bool {
    text.split_whitespace()
        .any(|token| token.chars().any(|c| c.is_ascii_digit()))
}

fn is_bullet_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("- ")
        || trimmed.starts_with("• ")
        || trimmed.starts_with("* ")
        || trimmed.starts_with("– ")
}

/// Mean words per sentence over prose lines; bullet lines are left out.
fn average_sentence_words(text: &str) -> Option<f64> {
    let prose: String = text
        .lines()
        .filter(|l| !is_bullet_line(l))
        .collect::<Vec<_>>()
        .join(" ");
    let counts: Vec<usize> = prose
        .split(['.', '!', '?'])
        .map(|s| s.split_whitespace().count())
        .filter(|n| *n > 0)
        .collect();
    if counts.is_empty() {
        None
    } else {
        Some(counts.iter().sum::<usize>() as f64 / counts.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::models::fixtures::sample_content;

    const TWELVE_WORDS: &str =
        "Esta bicicleta tiene cuadro de aluminio liviano y cambios Shimano recién revisados.";

    #[test]
    fn weights_sum_to_one() {
        let total =
            COMPLETENESS_WEIGHT + READABILITY_WEIGHT + COMPLIANCE_WEIGHT + SEO_WEIGHT + MOBILE_WEIGHT;
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn well_formed_listing_scores_high() {
        let mut content = sample_content();
        content.description = format!(
            "{TWELVE_WORDS} {TWELVE_WORDS}\n\n{TWELVE_WORDS}\n\n- Rodado 26\n- 21 velocidades"
        );
        let breakdown = score(&content, 0);
        assert_eq!(breakdown.completeness, 1.0);
        assert_eq!(breakdown.mobile, 0.5);
        assert!((breakdown.seo - 1.0).abs() < 1e-12);
        assert_eq!(breakdown.compliance, 1.0);
        assert!(breakdown.overall > 0.8);
    }

    #[test]
    fn violations_reduce_compliance_but_not_below_zero() {
        let content = sample_content();
        assert!((score(&content, 2).compliance - 0.6).abs() < 1e-12);
        assert_eq!(score(&content, 9).compliance, 0.0);
    }

    #[test]
    fn mobile_penalises_wide_lines() {
        let narrow = "Linea corta\n\nOtra linea corta";
        assert_eq!(mobile_friendliness(narrow), 1.0);
        let wide = "x".repeat(120);
        let text = format!("{wide}\n{wide}\ncorta");
        assert_eq!(mobile_friendliness(&text), 0.5);
        assert_eq!(mobile_friendliness(""), 0.0);
    }

    #[test]
    fn sentence_average_ignores_bullets() {
        let text = format!("{TWELVE_WORDS}\n- a\n- b");
        assert_eq!(average_sentence_words(&text), Some(12.0));
    }

    #[test]
    fn numeric_token_detection() {
        assert!(has_numeric_token("Bicicleta Rodado 26"));
        assert!(!has_numeric_token("Bicicleta Rodado"));
    }
}
