//! Export run configuration.
//!
//! This module provides the `ExportOptions` struct that threads the failure
//! policy, relation inference settings and resource bounds through one
//! export run.

use super::SamplingOptions;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Output format options for serialized schema documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Pretty-printed JSON
    #[default]
    Json,
    /// Single-line JSON
    JsonCompact,
}

impl FromStr for OutputFormat {
    type Err = crate::error::SchemaportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "json-compact" => Ok(Self::JsonCompact),
            other => Err(crate::error::SchemaportError::configuration(format!(
                "Unknown output format '{}' (expected json or json-compact)",
                other
            ))),
        }
    }
}

/// What an export run does when one entity fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort remaining entity work, keep what was already produced
    #[default]
    FailFast,
    /// Record the failure, skip the entity, continue
    IgnoreErrors,
}

/// Name-match relation inference settings.
///
/// Declared relations always carry confidence 1.0; both heuristic confidences
/// must stay below it, exact-suffix above substring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelationInferenceConfig {
    /// Whether name-match candidates are proposed at all
    pub enabled: bool,
    /// Confidence for `<entity>_id` style exact matches
    pub exact_suffix_confidence: f64,
    /// Confidence for names that merely end with such a suffix
    pub substring_confidence: f64,
}

impl Default for RelationInferenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            exact_suffix_confidence: 0.8,
            substring_confidence: 0.5,
        }
    }
}

impl RelationInferenceConfig {
    /// Builder method to toggle inference.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Validates the confidence ordering.
    ///
    /// # Errors
    /// Returns error unless `0 < substring < exact_suffix < 1`
    pub fn validate(&self) -> crate::Result<()> {
        let ordered = 0.0 < self.substring_confidence
            && self.substring_confidence < self.exact_suffix_confidence
            && self.exact_suffix_confidence < 1.0;
        if !ordered {
            return Err(crate::error::SchemaportError::configuration(
                "relation confidences must satisfy 0 < substring < exact suffix < 1",
            ));
        }
        Ok(())
    }
}

/// Configuration for one export run.
///
/// # Example
/// ```rust
/// use schemaport_core::connectors::{ExportOptions, FailurePolicy};
///
/// let options = ExportOptions::new()
///     .with_failure_policy(FailurePolicy::IgnoreErrors)
///     .with_max_concurrency(8);
///
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportOptions {
    pub sampling: SamplingOptions,
    pub relations: RelationInferenceConfig,
    pub failure_policy: FailurePolicy,
    /// Maximum entities sampled at the same time (1-64)
    pub max_concurrency: u32,
    /// Per-entity sampling timeout in seconds
    pub sample_timeout_secs: u64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            sampling: SamplingOptions::default(),
            relations: RelationInferenceConfig::default(),
            failure_policy: FailurePolicy::FailFast,
            max_concurrency: 4,
            sample_timeout_secs: 30,
        }
    }
}

impl ExportOptions {
    /// Creates export options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set sampling options.
    pub fn with_sampling(mut self, sampling: SamplingOptions) -> Self {
        self.sampling = sampling;
        self
    }

    /// Builder method to set relation inference settings.
    pub fn with_relations(mut self, relations: RelationInferenceConfig) -> Self {
        self.relations = relations;
        self
    }

    /// Builder method to set the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Builder method to bound concurrent entity sampling.
    pub fn with_max_concurrency(mut self, max: u32) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Builder method to set the per-entity sampling timeout.
    pub fn with_sample_timeout(mut self, timeout: Duration) -> Self {
        self.sample_timeout_secs = timeout.as_secs();
        self
    }

    /// Per-entity sampling timeout.
    pub fn sample_timeout(&self) -> Duration {
        Duration::from_secs(self.sample_timeout_secs)
    }

    /// Validates the export options.
    ///
    /// # Errors
    /// Returns error if any bound is zero or unsafe
    pub fn validate(&self) -> crate::Result<()> {
        self.sampling.validate()?;
        self.relations.validate()?;

        if self.max_concurrency == 0 {
            return Err(crate::error::SchemaportError::configuration(
                "max_concurrency must be greater than 0",
            ));
        }

        if self.max_concurrency > 64 {
            return Err(crate::error::SchemaportError::configuration(
                "max_concurrency should not exceed 64 to avoid saturating the source",
            ));
        }

        if self.sample_timeout_secs == 0 {
            return Err(crate::error::SchemaportError::configuration(
                "sample_timeout must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_options_default() {
        let options = ExportOptions::default();
        assert_eq!(options.failure_policy, FailurePolicy::FailFast);
        assert_eq!(options.max_concurrency, 4);
        assert_eq!(options.sample_timeout(), Duration::from_secs(30));
        assert!(!options.relations.enabled);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_export_options_validation() {
        assert!(ExportOptions::new().with_max_concurrency(0).validate().is_err());
        assert!(ExportOptions::new().with_max_concurrency(100).validate().is_err());
        assert!(
            ExportOptions::new()
                .with_sample_timeout(Duration::from_millis(10))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_relation_confidence_ordering() {
        let inverted = RelationInferenceConfig {
            enabled: true,
            exact_suffix_confidence: 0.4,
            substring_confidence: 0.6,
        };
        assert!(inverted.validate().is_err());

        let declared_level = RelationInferenceConfig {
            exact_suffix_confidence: 1.0,
            ..Default::default()
        };
        assert!(declared_level.validate().is_err());
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("json".parse::<OutputFormat>().ok(), Some(OutputFormat::Json));
        assert_eq!(
            "json-compact".parse::<OutputFormat>().ok(),
            Some(OutputFormat::JsonCompact)
        );
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_export_options_from_gateway_payload() {
        let options: ExportOptions = serde_json::from_str(
            r#"{"failurePolicy": "ignore-errors", "relations": {"enabled": true}, "sampling": {"sampleSize": 3}}"#,
        )
        .unwrap();
        assert_eq!(options.failure_policy, FailurePolicy::IgnoreErrors);
        assert!(options.relations.enabled);
        assert_eq!(options.relations.exact_suffix_confidence, 0.8);
        assert_eq!(options.sampling.sample_size, 3);
        assert_eq!(options.max_concurrency, 4);
    }
}
