//! Prints random primes found by a fan-out/fan-in pipeline.
//!
//! Samples integers uniformly from a configured range, filters them for primality on every
//! available core, prints the first primes to stdout, and finishes with the elapsed wall time.
//! Diagnostics go to stderr.

use std::process::ExitCode;

use conduit_config::shared::PrimesConfig;
use conduit_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_primes_config;
use crate::error::{PrimesError, PrimesResult};

mod config;
mod core;
mod error;
mod primality;

/// Entry point for the primes binary.
///
/// Loads configuration, initializes tracing, and runs the pipeline on a multi-threaded runtime.
/// Failures are reported on stderr with a non-zero exit code.
fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run() -> PrimesResult<()> {
    let primes_config = load_primes_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME")).map_err(PrimesError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(primes_config))?;

    Ok(())
}

async fn async_main(primes_config: PrimesConfig) -> PrimesResult<()> {
    if let Err(err) = core::run(primes_config).await {
        error!("{err:#}");
        return Err(err.into());
    }

    Ok(())
}
