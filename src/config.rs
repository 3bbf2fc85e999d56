use crate::compliance::ComplianceRules;
use crate::retry::BackoffPolicy;
use std::{env, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read compliance rules at {path}: {source}")]
    RulesIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid compliance rules at {path}: {source}")]
    RulesFormat {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Process-wide settings, read once at start-up from the environment
/// (after `.env` has been merged in by `dotenvy`).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub estimated_generation: Duration,
    pub quality_threshold: f64,
    pub fallback_confidence: f64,
    pub default_currency: String,
    pub backoff: BackoffPolicy,
    pub progress_channel_capacity: usize,
    pub progress_send_timeout: Duration,
    pub max_images: usize,
    pub queue_capacity: usize,
    /// How long finished runs stay pollable.
    pub status_ttl: Duration,
    pub request_max_bytes: usize,
    pub redis_url: Option<String>,
    pub compliance_rules_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            estimated_generation: Duration::from_secs(45),
            quality_threshold: 0.7,
            fallback_confidence: 0.3,
            default_currency: "ARS".into(),
            backoff: BackoffPolicy::default(),
            progress_channel_capacity: 32,
            progress_send_timeout: Duration::from_secs(2),
            max_images: 10,
            queue_capacity: 64,
            status_ttl: Duration::from_secs(3600),
            request_max_bytes: 256 * 1024,
            redis_url: None,
            compliance_rules_path: None,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let backoff = BackoffPolicy::new(
            env_or("AI_MAX_ATTEMPTS", defaults.backoff.max_attempts),
            Duration::from_millis(env_or("AI_BASE_DELAY_MS", 500)),
        )
        .with_max_delay(Duration::from_millis(env_or("AI_MAX_DELAY_MS", 8000)))
        .with_jitter(env_or("AI_JITTER", defaults.backoff.jitter));

        Self {
            port: env_or("PORT", defaults.port),
            estimated_generation: Duration::from_secs(env_or("ESTIMATED_GENERATION_SECS", 45)),
            quality_threshold: unit_interval(env_or("QUALITY_THRESHOLD", defaults.quality_threshold))
                .unwrap_or(defaults.quality_threshold),
            fallback_confidence: unit_interval(env_or(
                "FALLBACK_CONFIDENCE",
                defaults.fallback_confidence,
            ))
            .unwrap_or(defaults.fallback_confidence),
            default_currency: env::var("DEFAULT_CURRENCY")
                .ok()
                .map(|v| v.trim().to_uppercase())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.default_currency),
            backoff,
            progress_channel_capacity: env_or("PROGRESS_CHANNEL_CAPACITY", 32usize).max(1),
            progress_send_timeout: Duration::from_millis(env_or("PROGRESS_SEND_TIMEOUT_MS", 2000)),
            max_images: env_or("MAX_IMAGES", defaults.max_images).max(1),
            queue_capacity: env_or("QUEUE_CAPACITY", defaults.queue_capacity).max(1),
            status_ttl: Duration::from_secs(env_or("STATUS_TTL_SECS", 3600)),
            request_max_bytes: env_or("REQUEST_MAX_BYTES", defaults.request_max_bytes).max(1),
            redis_url: non_empty_var("REDIS_URL"),
            compliance_rules_path: non_empty_var("COMPLIANCE_RULES_PATH").map(PathBuf::from),
        }
    }

    /// Built-in rule tables, optionally overridden by the YAML file at
    /// `COMPLIANCE_RULES_PATH`.
    pub fn compliance_rules(&self) -> Result<ComplianceRules, ConfigError> {
        let Some(path) = &self.compliance_rules_path else {
            return Ok(ComplianceRules::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::RulesIo {
            path: path.clone(),
            source,
        })?;
        ComplianceRules::from_yaml(&raw).map_err(|source| ConfigError::RulesFormat {
            path: path.clone(),
            source,
        })
    }
}

pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn unit_interval(value: f64) -> Option<f64> {
    (0.0..=1.0).contains(&value).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.fallback_confidence, 0.3);
        assert_eq!(cfg.default_currency, "ARS");
        assert_eq!(cfg.backoff.max_attempts, 3);
    }

    #[test]
    fn env_or_falls_back_on_garbage() {
        assert_eq!(env_or("HERMES_TEST_UNSET_KEY_81723", 7u32), 7);
    }

    #[test]
    fn unit_interval_rejects_out_of_range() {
        assert_eq!(unit_interval(0.5), Some(0.5));
        assert_eq!(unit_interval(1.5), None);
    }

    #[test]
    fn missing_rules_path_uses_builtins() {
        let rules = ServiceConfig::default().compliance_rules().expect("builtins");
        assert!(rules.spam_keywords.iter().any(|k| k == "garantizado"));
    }
}
