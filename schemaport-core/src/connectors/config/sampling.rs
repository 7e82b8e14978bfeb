//! Sampling configuration.
//!
//! Controls how many records are pulled per entity and how they are merged
//! into field descriptors.

use serde::{Deserialize, Serialize};

/// Default number of records sampled per entity.
pub const DEFAULT_SAMPLE_SIZE: u32 = 10;

/// Upper bound accepted for the sample size.
pub const MAX_SAMPLE_SIZE: u32 = 10_000;

/// Configuration for sampling one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingOptions {
    /// Number of records to sample per entity
    pub sample_size: u32,
    /// Field whose value splits a mixed collection into groups
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mixed_field: Option<String>,
    /// Maximum array elements inspected per field across the sample
    pub max_array_elements: u32,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            mixed_field: None,
            max_array_elements: 100,
        }
    }
}

impl SamplingOptions {
    /// Creates sampling options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set sample size.
    pub fn with_sample_size(mut self, size: u32) -> Self {
        self.sample_size = size;
        self
    }

    /// Builder method to set the discriminator field.
    pub fn with_mixed_field(mut self, field: Option<String>) -> Self {
        self.mixed_field = field.filter(|f| !f.trim().is_empty());
        self
    }

    /// Builder method to bound array element inspection.
    pub fn with_max_array_elements(mut self, max: u32) -> Self {
        self.max_array_elements = max;
        self
    }

    /// Validates sampling options.
    ///
    /// # Errors
    /// Returns error if the sample size is zero or unreasonably large
    pub fn validate(&self) -> crate::Result<()> {
        if self.sample_size == 0 {
            return Err(crate::error::SchemaportError::configuration(
                "sample_size must be greater than 0",
            ));
        }
        if self.sample_size > MAX_SAMPLE_SIZE {
            return Err(crate::error::SchemaportError::configuration(format!(
                "sample_size should not exceed {}",
                MAX_SAMPLE_SIZE
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_options_default() {
        let options = SamplingOptions::default();
        assert_eq!(options.sample_size, 10);
        assert!(options.mixed_field.is_none());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_sampling_options_builder() {
        let options = SamplingOptions::new()
            .with_sample_size(50)
            .with_mixed_field(Some("type".to_string()))
            .with_max_array_elements(5);

        assert_eq!(options.sample_size, 50);
        assert_eq!(options.mixed_field.as_deref(), Some("type"));
        assert_eq!(options.max_array_elements, 5);
    }

    #[test]
    fn test_blank_mixed_field_ignored() {
        let options = SamplingOptions::new().with_mixed_field(Some("  ".to_string()));
        assert!(options.mixed_field.is_none());
    }

    #[test]
    fn test_sampling_options_validation() {
        assert!(SamplingOptions::new().with_sample_size(0).validate().is_err());
        assert!(SamplingOptions::new().with_sample_size(20_000).validate().is_err());
    }

    #[test]
    fn test_sampling_options_deserialize_partial() {
        let options: SamplingOptions =
            serde_json::from_str(r#"{"sampleSize": 25, "mixedField": "kind"}"#).unwrap();
        assert_eq!(options.sample_size, 25);
        assert_eq!(options.mixed_field.as_deref(), Some("kind"));
        assert_eq!(options.max_array_elements, 100);
    }
}
