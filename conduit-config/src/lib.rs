//! Hierarchical configuration loading for conduit binaries.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{LoadConfigError, load_config, load_config_or_default};
