use conduit_config::load_config_or_default;
use conduit_config::shared::PrimesConfig;

use crate::error::{PrimesError, PrimesResult};

/// Loads and validates the configuration.
///
/// A missing `configuration` directory is not an error: defaults apply, overridable through
/// `APP_` environment variables.
pub fn load_primes_config() -> PrimesResult<PrimesConfig> {
    let config = load_config_or_default::<PrimesConfig>().map_err(PrimesError::config)?;
    config.validate().map_err(PrimesError::config)?;

    Ok(config)
}
