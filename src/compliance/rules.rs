use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?\(?\d{2,4}\)?[\s.-]?\d{3,4}[\s.-]?\d{4}")
        .expect("phone regex")
});

pub static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email regex")
});

pub static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("url regex"));

pub static HTML_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<\s*/?\s*([a-z][a-z0-9]*)\b[^>]*>").expect("html regex"));

/// Marketplace policy tables. Every list is matched case-insensitively on
/// whole words; promotional markers are counted as raw substrings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceRules {
    pub spam_keywords: Vec<String>,
    pub promotional_markers: Vec<String>,
    pub max_promotional_markers: usize,
    pub misleading_claims: Vec<String>,
    pub contact_keywords: Vec<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ComplianceRules {
    fn default() -> Self {
        Self {
            spam_keywords: owned(&[
                "garantizado",
                "100% original",
                "el mejor precio",
                "precio imperdible",
                "oferta imperdible",
                "no te lo pierdas",
                "única oportunidad",
                "liquidación total",
                "súper oferta",
                "super oferta",
                "compra ya",
                "ganga",
            ]),
            promotional_markers: owned(&[
                "!!", "$$", "***", "oferta", "promo", "descuento", "rebaja", "outlet", "🔥", "⭐",
            ]),
            max_promotional_markers: 3,
            misleading_claims: owned(&[
                "cura",
                "milagroso",
                "milagrosa",
                "sin efectos secundarios",
                "resultados garantizados",
                "100% efectivo",
                "clínicamente probado",
                "aprobado por la fda",
                "adelgaza",
                "réplica exacta",
            ]),
            contact_keywords: owned(&[
                "whatsapp",
                "wsp",
                "llamame",
                "llámame",
                "teléfono",
                "telefono",
                "celular",
                "contactame",
                "contáctame",
                "escribime",
                "mi número",
                "mi numero",
                "telegram",
                "instagram",
                "facebook",
            ]),
        }
    }
}

impl ComplianceRules {
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }
}

/// A rule term compiled to a whole-word, case-insensitive matcher.
#[derive(Debug, Clone)]
pub struct TermMatcher {
    pub term: String,
    pattern: Regex,
}

impl TermMatcher {
    pub fn find(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

pub fn compile_terms(terms: &[String]) -> Vec<TermMatcher> {
    terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .filter_map(|term| {
            // \b only anchors on word characters, so markers such as "100%"
            // get a boundary on the alphanumeric side only.
            let lead = if term.starts_with(|c: char| c.is_alphanumeric()) {
                r"\b"
            } else {
                ""
            };
            let trail = if term.ends_with(|c: char| c.is_alphanumeric()) {
                r"\b"
            } else {
                ""
            };
            let source = format!("(?i){lead}{}{trail}", regex::escape(term));
            match Regex::new(&source) {
                Ok(pattern) => Some(TermMatcher {
                    term: term.to_string(),
                    pattern,
                }),
                Err(err) => {
                    warn!(target = "hermes.compliance", term, error = %err, "rule_term_skipped");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_match_whole_words_only() {
        let matchers = compile_terms(&owned(&["cura"]));
        assert!(matchers[0].find("Esta crema cura todo"));
        assert!(!matchers[0].find("Hay que procurar el envío"));
        assert!(matchers[0].find("CURA"));
    }

    #[test]
    fn percent_terms_still_match() {
        let matchers = compile_terms(&owned(&["100% original"]));
        assert!(matchers[0].find("Zapatillas 100% ORIGINAL"));
    }

    #[test]
    fn contact_patterns() {
        assert!(PHONE_RE.is_match("llamar al 11 4567-8901"));
        assert!(PHONE_RE.is_match("+54 9 351 555 1234"));
        assert!(!PHONE_RE.is_match("Bicicleta rodado 26, 21 velocidades"));
        assert!(EMAIL_RE.is_match("ventas@tienda.com.ar"));
        assert!(URL_RE.is_match("mirá www.mitienda.com"));
        assert!(HTML_TAG_RE.is_match("<script>alert(1)</script>"));
    }

    #[test]
    fn yaml_overrides_keep_defaults_for_missing_fields() {
        let rules = ComplianceRules::from_yaml("spam_keywords: [regalado]\nmax_promotional_markers: 1\n")
            .expect("yaml");
        assert_eq!(rules.spam_keywords, vec!["regalado".to_string()]);
        assert_eq!(rules.max_promotional_markers, 1);
        assert_eq!(rules.contact_keywords, ComplianceRules::default().contact_keywords);
    }
}
