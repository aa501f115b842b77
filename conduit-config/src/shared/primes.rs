use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Complete configuration for the random primes binary.
///
/// Every field has a default, so an empty configuration source is valid.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PrimesConfig {
    /// Shape of the pipeline output.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Range the candidates are drawn from.
    #[serde(default)]
    pub sampling: SamplingConfig,
}

impl PrimesConfig {
    /// Validates every section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.sampling.validate()
    }
}

/// Pipeline output settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Number of items printed before the pipeline is shut down.
    #[serde(default = "default_take_count")]
    pub take_count: usize,
}

impl PipelineConfig {
    pub const DEFAULT_TAKE_COUNT: usize = 100;
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            take_count: default_take_count(),
        }
    }
}

/// Candidate sampling settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SamplingConfig {
    /// Exclusive upper bound of the uniformly sampled candidates; the lower bound is zero.
    #[serde(default = "default_upper_bound")]
    pub upper_bound: u64,
}

impl SamplingConfig {
    pub const DEFAULT_UPPER_BOUND: u64 = 1_000_000_000;

    /// Ensures the sampling range is not empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.upper_bound == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "sampling.upper_bound".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            upper_bound: default_upper_bound(),
        }
    }
}

fn default_take_count() -> usize {
    PipelineConfig::DEFAULT_TAKE_COUNT
}

fn default_upper_bound() -> u64 {
    SamplingConfig::DEFAULT_UPPER_BOUND
}
