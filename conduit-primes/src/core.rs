use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::time::Instant;

use conduit::concurrency::sequence::SequenceRx;
use conduit::concurrency::shutdown::ShutdownTx;
use conduit::error::ConduitResult;
use conduit::pipeline::Pipeline;
use conduit_config::shared::PrimesConfig;
use rand::Rng;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::primality::is_prime;

/// Prints `take_count` random primes followed by the elapsed wall time, then stops the pipeline.
///
/// Candidates are drawn uniformly from `[0, upper_bound)` and tested by one filter per available
/// core. A SIGINT or SIGTERM shuts the pipeline down early; the primes printed so far and the
/// elapsed time are still reported.
pub async fn run(config: PrimesConfig) -> anyhow::Result<()> {
    log_config(&config);

    let started = Instant::now();

    let mut pipeline = Pipeline::new();
    // Shutdown fires on every way out of this function, including early returns.
    let _shutdown_guard = pipeline.shutdown_tx().drop_guard();
    let signal_handle = spawn_signal_listener(pipeline.shutdown_tx());

    let take_count = config.pipeline.take_count;
    let taken = wire_primes(
        &mut pipeline,
        config.sampling.upper_bound,
        available_parallelism(),
        take_count,
    )?;

    let printed = print_primes(&taken, started, &mut io::stdout()).await?;
    if printed < take_count {
        warn!(
            printed,
            requested = take_count,
            "pipeline stopped before producing every requested prime"
        );
    }

    signal_handle.abort();
    let _ = signal_handle.await;

    pipeline.shutdown_and_wait().await?;

    Ok(())
}

/// Wires random candidates below `upper_bound` through `workers` primality filters, merged and
/// capped at `take_count` items.
fn wire_primes(
    pipeline: &mut Pipeline,
    upper_bound: u64,
    workers: usize,
    take_count: usize,
) -> ConduitResult<SequenceRx<u64>> {
    let candidates = pipeline.generate(move || rand::thread_rng().gen_range(0..upper_bound));
    let primes = pipeline.fan_out(candidates, workers, |n: &u64| is_prime(*n))?;
    let merged = pipeline.merge(primes);

    Ok(pipeline.take(merged, take_count))
}

/// Writes every item of `taken` on its own line, then the time elapsed since `started`.
///
/// Returns the number of items written. Write failures are reported as
/// [`conduit::error::ErrorKind::IoError`].
async fn print_primes<W: Write>(
    taken: &SequenceRx<u64>,
    started: Instant,
    out: &mut W,
) -> ConduitResult<usize> {
    let mut printed = 0;
    while let Some(prime) = taken.recv().await {
        writeln!(out, "{prime}")?;
        printed += 1;
    }

    writeln!(out, "{:?}", started.elapsed())?;
    out.flush()?;

    Ok(printed)
}

/// Spawns a task triggering `shutdown_tx` on SIGINT or SIGTERM.
fn spawn_signal_listener(shutdown_tx: ShutdownTx) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                warn!(error = %err, "failed to register SIGTERM handler, only ctrl+c stops the pipeline early");
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("sigint (ctrl+c) received, shutting down pipeline");
                    shutdown_tx.shutdown();
                }
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("sigint (ctrl+c) received, shutting down pipeline");
            }
            _ = sigterm.recv() => {
                info!("sigterm received, shutting down pipeline");
            }
        }

        shutdown_tx.shutdown();
    })
}

/// Returns the number of filter instances to run, one per available core.
fn available_parallelism() -> usize {
    match std::thread::available_parallelism() {
        Ok(parallelism) => parallelism.get(),
        Err(err) => {
            warn!(error = %err, "could not determine available parallelism, using a single filter");
            NonZeroUsize::MIN.get()
        }
    }
}

fn log_config(config: &PrimesConfig) {
    debug!(
        take_count = config.pipeline.take_count,
        upper_bound = config.sampling.upper_bound,
        "primes config"
    );
}
