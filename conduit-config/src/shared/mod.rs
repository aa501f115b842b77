//! Configuration types shared by conduit binaries.

mod base;
mod primes;

pub use base::ValidationError;
pub use primes::{PipelineConfig, PrimesConfig, SamplingConfig};
