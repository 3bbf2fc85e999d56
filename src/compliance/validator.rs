use super::quality::{self, QualityBreakdown};
use super::rules::{
    ComplianceRules, EMAIL_RE, HTML_TAG_RE, PHONE_RE, TermMatcher, URL_RE, compile_terms,
};
use crate::listing::confidence::WEAK_COMPONENT_THRESHOLD;
use crate::listing::models::{description_length_error, title_length_error};
use crate::listing::GeneratedContent;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    SpamKeyword,
    PromotionalMarkers,
    MisleadingClaim,
    ContactInformation,
    ExternalLink,
    InvalidPrice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentField {
    Title,
    Description,
    Price,
}

impl ContentField {
    fn as_str(&self) -> &'static str {
        match self {
            ContentField::Title => "title",
            ContentField::Description => "description",
            ContentField::Price => "price",
        }
    }
}

/// A detected breach of marketplace content policy. Advisory: it never fails a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceViolation {
    pub kind: ViolationKind,
    pub field: ContentField,
    pub matched: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub is_compliant: bool,
    pub violations: Vec<ComplianceViolation>,
}

/// Per-field checks from `validate_content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentCheck {
    pub quality_score: f64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Combined structural + compliance + quality verdict for one piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub quality_score: f64,
    pub violations: Vec<ComplianceViolation>,
    pub meets_quality_threshold: bool,
}

impl ValidationOutcome {
    pub fn is_compliant(&self) -> bool {
        self.violations.is_empty()
    }

    /// Copy with extra warnings appended.
    pub fn with_warnings(&self, extra: impl IntoIterator<Item = String>) -> Self {
        let mut next = self.clone();
        next.warnings.extend(extra);
        next
    }
}

pub struct ComplianceValidator {
    rules: ComplianceRules,
    spam: Vec<TermMatcher>,
    misleading: Vec<TermMatcher>,
    contact: Vec<TermMatcher>,
    quality_threshold: f64,
}

impl Default for ComplianceValidator {
    fn default() -> Self {
        Self::new(ComplianceRules::default(), 0.7)
    }
}

impl ComplianceValidator {
    pub fn new(rules: ComplianceRules, quality_threshold: f64) -> Self {
        Self {
            spam: compile_terms(&rules.spam_keywords),
            misleading: compile_terms(&rules.misleading_claims),
            contact: compile_terms(&rules.contact_keywords),
            rules,
            quality_threshold,
        }
    }

    pub fn quality_threshold(&self) -> f64 {
        self.quality_threshold
    }

    pub fn validate_content(&self, content: &GeneratedContent) -> ContentCheck {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        errors.extend(title_length_error(&content.title));
        errors.extend(description_length_error(&content.description));

        if !(content.price.amount.is_finite() && content.price.amount > 0.0) {
            errors.push(format!("price must be positive (got {})", content.price.amount));
        } else if content.price.amount > 1_000_000_000.0 {
            warnings.push("price is unusually high; double check the amount".to_string());
        }

        for (field, text) in [
            (ContentField::Title, content.title.as_str()),
            (ContentField::Description, content.description.as_str()),
        ] {
            if let Some(tag) = HTML_TAG_RE.captures(text).and_then(|c| c.get(1)) {
                errors.push(format!(
                    "{} contains prohibited HTML <{}>",
                    field.as_str(),
                    tag.as_str().to_lowercase()
                ));
            }
            if PHONE_RE.is_match(text) || EMAIL_RE.is_match(text) {
                errors.push(format!("{} contains contact information", field.as_str()));
            }
            if URL_RE.is_match(text) {
                errors.push(format!("{} contains an external link", field.as_str()));
            }
        }

        if is_shouting(&content.title) {
            warnings.push("title is written in capital letters".to_string());
        }
        if content.title.contains('!') {
            warnings.push("title contains exclamation marks".to_string());
        }
        if quality::paragraphs(&content.description).len() < 2 {
            warnings.push("description is a single block of text".to_string());
        }

        let violations = self.check_compliance(content).violations.len();
        ContentCheck {
            quality_score: quality::score(content, violations).overall,
            errors,
            warnings,
        }
    }

    pub fn check_compliance(&self, content: &GeneratedContent) -> ComplianceReport {
        let mut violations = Vec::new();
        violations.extend(self.scan_text(ContentField::Title, &content.title));
        violations.extend(self.scan_text(ContentField::Description, &content.description));

        let marker_count: usize = self
            .rules
            .promotional_markers
            .iter()
            .filter(|m| !m.is_empty())
            .map(|marker| {
                let marker = marker.to_lowercase();
                let title = content.title.to_lowercase();
                let description = content.description.to_lowercase();
                title.matches(marker.as_str()).count() + description.matches(marker.as_str()).count()
            })
            .sum();
        if marker_count > self.rules.max_promotional_markers {
            violations.push(ComplianceViolation {
                kind: ViolationKind::PromotionalMarkers,
                field: ContentField::Description,
                matched: marker_count.to_string(),
                severity: Severity::Low,
                message: format!(
                    "{marker_count} promotional markers found (max {})",
                    self.rules.max_promotional_markers
                ),
            });
        }

        let amount = content.price.amount;
        if !(amount.is_finite() && amount > 0.0) {
            violations.push(price_violation(amount, "price must be positive"));
        } else if !has_at_most_two_decimals(amount) {
            violations.push(price_violation(amount, "price has more than 2 decimal places"));
        }

        if !violations.is_empty() {
            debug!(
                target = "hermes.compliance",
                content_id = %content.id,
                violations = violations.len(),
                "compliance_violations"
            );
        }
        ComplianceReport {
            is_compliant: violations.is_empty(),
            violations,
        }
    }

    /// Rule-table and pattern scan over one text field.
    pub fn scan_text(&self, field: ContentField, text: &str) -> Vec<ComplianceViolation> {
        let mut found = Vec::new();
        let tables = [
            (&self.spam, ViolationKind::SpamKeyword, Severity::Medium, "spam keyword"),
            (
                &self.misleading,
                ViolationKind::MisleadingClaim,
                Severity::High,
                "misleading claim",
            ),
            (
                &self.contact,
                ViolationKind::ContactInformation,
                Severity::High,
                "contact reference",
            ),
        ];
        for (matchers, kind, severity, label) in tables {
            for matcher in matchers.iter().filter(|m| m.find(text)) {
                found.push(ComplianceViolation {
                    kind,
                    field,
                    matched: matcher.term.clone(),
                    severity,
                    message: format!("{} contains {label} \"{}\"", field.as_str(), matcher.term),
                });
            }
        }
        for (pattern, label) in [(&*PHONE_RE, "phone number"), (&*EMAIL_RE, "email address")] {
            if let Some(hit) = pattern.find(text) {
                found.push(ComplianceViolation {
                    kind: ViolationKind::ContactInformation,
                    field,
                    matched: hit.as_str().to_string(),
                    severity: Severity::High,
                    message: format!("{} contains a {label}", field.as_str()),
                });
            }
        }
        for hit in URL_RE.find_iter(text) {
            found.push(ComplianceViolation {
                kind: ViolationKind::ExternalLink,
                field,
                matched: hit.as_str().to_string(),
                severity: Severity::High,
                message: format!("{} links outside the marketplace", field.as_str()),
            });
        }
        found
    }

    pub fn calculate_quality_score(&self, content: &GeneratedContent) -> QualityBreakdown {
        let violations = self.check_compliance(content).violations.len();
        quality::score(content, violations)
    }

    /// Advisory hints; none of them block publication.
    pub fn improvement_suggestions(&self, content: &GeneratedContent) -> Vec<String> {
        let mut hints = Vec::new();
        let title_len = content.title.trim().chars().count();
        if title_len < 25 {
            hints.push("Title is short: add brand, model or a key spec".to_string());
        } else if title_len > 55 {
            hints.push("Title is close to the 60 character limit; drop filler words".to_string());
        }
        if !quality::has_numeric_token(&content.title) {
            hints.push("Include a numeric spec (size, capacity, year) in the title".to_string());
        }
        if !quality::has_bullets(&content.description) {
            hints.push("Add a bullet list with the main features".to_string());
        }
        if content.description.trim().chars().count() < 200 {
            hints.push("Expand the description to at least 200 characters".to_string());
        }
        if quality::paragraphs(&content.description).len() < 2 {
            hints.push("Split the description into short paragraphs".to_string());
        }
        if content.attributes.len() < 3 {
            hints.push("Complete at least 3 attributes for better search placement".to_string());
        }
        let amount = content.price.amount;
        if amount >= 100.0 && (amount % 100.0).abs() < f64::EPSILON {
            hints.push(format!(
                "Prices ending in round hundreds convert worse; consider {:.0}",
                amount - 10.0
            ));
        }
        for aspect in content.confidence.weak_components(WEAK_COMPONENT_THRESHOLD) {
            hints.push(format!("Review the {aspect}: generation confidence is low"));
        }
        let report = self.check_compliance(content);
        if !report.is_compliant {
            let terms: Vec<&str> = report
                .violations
                .iter()
                .map(|v| v.matched.as_str())
                .collect();
            hints.push(format!("Remove flagged content: {}", terms.join(", ")));
        }
        hints
    }

    /// Full verdict. Any error (structure, markup, contact details, links) makes
    /// it invalid; violations and a low quality score are reported but do not.
    pub fn validate(&self, content: &GeneratedContent) -> ValidationOutcome {
        let report = self.check_compliance(content);
        let check = self.validate_content(content);
        let mut errors = content.structural_errors();
        for err in check.errors {
            if !errors.contains(&err) {
                errors.push(err);
            }
        }
        ValidationOutcome {
            is_valid: errors.is_empty(),
            errors,
            warnings: check.warnings,
            quality_score: check.quality_score,
            meets_quality_threshold: check.quality_score >= self.quality_threshold,
            violations: report.violations,
        }
    }
}

fn price_violation(amount: f64, message: &str) -> ComplianceViolation {
    ComplianceViolation {
        kind: ViolationKind::InvalidPrice,
        field: ContentField::Price,
        matched: amount.to_string(),
        severity: Severity::High,
        message: message.to_string(),
    }
}

fn has_at_most_two_decimals(amount: f64) -> bool {
    let cents = amount * 100.0;
    (cents - cents.round()).abs() < 1e-6
}

fn is_shouting(text: &str) -> bool {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 10 && letters.iter().filter(|c| c.is_uppercase()).count() * 10 >= letters.len() * 8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::models::fixtures::sample_content;

    fn validator() -> ComplianceValidator {
        ComplianceValidator::default()
    }

    #[test]
    fn clean_listing_is_compliant() {
        let report = validator().check_compliance(&sample_content());
        assert!(report.is_compliant, "{:?}", report.violations);
    }

    #[test]
    fn garantizado_is_spam() {
        let mut content = sample_content();
        content.description.push_str("\n\nFuncionamiento garantizado.");
        let report = validator().check_compliance(&content);
        assert!(!report.is_compliant);
        assert!(report.violations.iter().any(|v| v.kind == ViolationKind::SpamKeyword
            && v.matched == "garantizado"
            && v.field == ContentField::Description));
    }

    #[test]
    fn hundred_percent_original_is_spam() {
        let mut content = sample_content();
        content.title = "Zapatillas Running 100% original".into();
        let report = validator().check_compliance(&content);
        assert!(!report.is_compliant);
        assert!(report.violations.iter().any(|v| v.kind == ViolationKind::SpamKeyword
            && v.matched == "100% original"
            && v.field == ContentField::Title));
    }

    #[test]
    fn contact_information_and_links_are_flagged() {
        let mut content = sample_content();
        content.description = "Escribime por whatsapp al 11 4567-8901 o a ventas@tienda.com, \
                               catálogo en https://mitienda.com.ar"
            .into();
        let kinds: Vec<ViolationKind> = validator()
            .check_compliance(&content)
            .violations
            .into_iter()
            .map(|v| v.kind)
            .collect();
        assert!(kinds.contains(&ViolationKind::ContactInformation));
        assert!(kinds.contains(&ViolationKind::ExternalLink));
        assert!(kinds.iter().filter(|k| **k == ViolationKind::ContactInformation).count() >= 3);
    }

    #[test]
    fn excessive_promotional_markers() {
        let mut content = sample_content();
        content.description = "Oferta!! Descuento!! Promo!! Oferta de la semana, rebaja total en outlet.".into();
        let report = validator().check_compliance(&content);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::PromotionalMarkers));
    }

    #[test]
    fn misleading_claims_are_high_severity() {
        let mut content = sample_content();
        content.description.push_str("\n\nProducto milagroso sin efectos secundarios.");
        let report = validator().check_compliance(&content);
        let misleading: Vec<_> = report
            .violations
            .iter()
            .filter(|v| v.kind == ViolationKind::MisleadingClaim)
            .collect();
        assert_eq!(misleading.len(), 2);
        assert!(misleading.iter().all(|v| v.severity == Severity::High));
    }

    #[test]
    fn price_precision_rule() {
        let mut content = sample_content();
        content.price.amount = 10.999;
        let report = validator().check_compliance(&content);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::InvalidPrice));
        content.price.amount = 10.99;
        assert!(validator().check_compliance(&content).is_compliant);
    }

    #[test]
    fn validate_content_reports_html_and_lengths() {
        let mut content = sample_content();
        content.title = "Corto".into();
        content.description = "<script>alert(1)</script> texto".into();
        let check = validator().validate_content(&content);
        assert!(check.errors.iter().any(|e| e.starts_with("title length 5")));
        assert!(check.errors.iter().any(|e| e.contains("prohibited HTML <script>")));
        assert!(check.errors.iter().any(|e| e.starts_with("description length")));
        assert!((0.0..=1.0).contains(&check.quality_score));
    }

    #[test]
    fn shouting_title_is_a_warning() {
        let mut content = sample_content();
        content.title = "BICICLETA RODADO 26 USADA".into();
        let check = validator().validate_content(&content);
        assert!(check.warnings.iter().any(|w| w.contains("capital letters")));
        assert!(check.errors.is_empty());
    }

    #[test]
    fn violations_do_not_invalidate_structure() {
        let mut content = sample_content();
        content.description.push_str("\n\nEnvío garantizado a todo el país.");
        let outcome = validator().validate(&content);
        assert!(outcome.is_valid);
        assert!(!outcome.is_compliant());
    }

    #[test]
    fn markup_and_contact_details_invalidate_the_outcome() {
        let mut content = sample_content();
        content.description = format!(
            "{}\n\n<b>Consultas</b> a ventas@tienda.com o en www.mitienda.com",
            content.description
        );
        let outcome = validator().validate(&content);
        assert!(!outcome.is_valid);
        assert!(outcome.errors.iter().any(|e| e.contains("prohibited HTML <b>")));
        assert!(outcome.errors.iter().any(|e| e.contains("contact information")));
        assert!(outcome.errors.iter().any(|e| e.contains("external link")));
        assert!(content.structural_errors().is_empty());
    }

    #[test]
    fn suggestions_flag_round_prices_and_missing_specs() {
        let mut content = sample_content();
        content.title = "Bicicleta de paseo".into();
        content.price.amount = 150_000.0;
        content.attributes.clear();
        let hints = validator().improvement_suggestions(&content);
        assert!(hints.iter().any(|h| h.contains("round hundreds")));
        assert!(hints.iter().any(|h| h.contains("numeric spec")));
        assert!(hints.iter().any(|h| h.contains("3 attributes")));
        assert!(hints.iter().any(|h| h.starts_with("Title is short")));
    }
}
