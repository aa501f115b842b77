use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::concurrency::sequence::{SequenceRx, sequence};
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::error::{ConduitError, ConduitResult};
use crate::stages::filter::{replicate_predicate, run_filter};
use crate::stages::generate::run_generator;
use crate::stages::merge::run_merge;
use crate::stages::take::run_take;
use crate::stages::{StageKind, StageOutcome};

/// A linear fan-out/fan-in pipeline sharing one shutdown signal.
///
/// [`Pipeline`] creates the shutdown signal before any stage exists and spawns every stage on a
/// tracked task set, so that [`Pipeline::wait`] can join them and report failed stages. Stages are
/// wired leaf to root:
///
/// ```ignore
/// let mut pipeline = Pipeline::new();
/// let source = pipeline.generate(produce);
/// let filtered = pipeline.fan_out(source, workers, predicate)?;
/// let merged = pipeline.merge(filtered);
/// let taken = pipeline.take(merged, 100);
/// ```
///
/// Dropping the pipeline without waiting aborts every stage task still running, closing their
/// outputs without the usual stop logging. Use [`Pipeline::shutdown_and_wait`] to stop stages
/// cooperatively.
#[derive(Debug)]
pub struct Pipeline {
    shutdown_tx: ShutdownTx,
    stages: JoinSet<(StageKind, ConduitResult<StageOutcome>)>,
}

impl Pipeline {
    /// Creates an empty pipeline with a fresh shutdown signal.
    pub fn new() -> Self {
        // The receiver is not kept, every stage subscribes through the transmitter.
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            shutdown_tx,
            stages: JoinSet::new(),
        }
    }

    /// Returns a handle to the pipeline's shutdown signal.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Returns the number of stage tasks that have not been joined yet.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Adds a generator calling `producer` for every item.
    pub fn generate<T, F>(&mut self, producer: F) -> SequenceRx<T>
    where
        T: Send + 'static,
        F: FnMut() -> T + Send + 'static,
    {
        let (output, rx) = sequence();
        let shutdown_rx = self.shutdown_tx.subscribe();

        self.stages.spawn(async move {
            let outcome = run_generator(shutdown_rx, producer, output).await;
            (StageKind::Generator, Ok(outcome))
        });

        rx
    }

    /// Adds a pool of `workers` filter instances sharing `input`.
    ///
    /// Fails with [`crate::error::ErrorKind::InvalidConfig`] when `workers` is zero.
    pub fn fan_out<T, P>(
        &mut self,
        input: SequenceRx<T>,
        workers: usize,
        predicate: P,
    ) -> ConduitResult<Vec<SequenceRx<T>>>
    where
        T: Send + 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicates = replicate_predicate(predicate, workers)?;

        let mut outputs = Vec::with_capacity(workers);
        for (index, predicate) in predicates.into_iter().enumerate() {
            let (output, rx) = sequence();
            let shutdown_rx = self.shutdown_tx.subscribe();
            let input = input.clone();

            self.stages.spawn(async move {
                let outcome = run_filter(index, shutdown_rx, input, predicate, output).await;
                (StageKind::Filter { index }, Ok(outcome))
            });

            outputs.push(rx);
        }

        debug!(workers, "filter pool spawned");

        Ok(outputs)
    }

    /// Adds a merger combining `inputs` into one sequence.
    pub fn merge<T>(&mut self, inputs: Vec<SequenceRx<T>>) -> SequenceRx<T>
    where
        T: Send + 'static,
    {
        let (output, rx) = sequence();
        let shutdown_rx = self.shutdown_tx.subscribe();

        self.stages.spawn(async move {
            let result = run_merge(shutdown_rx, inputs, output).await;
            (StageKind::MergeJoin, result)
        });

        rx
    }

    /// Adds a bounded consumer forwarding at most `n` items of `input`.
    pub fn take<T>(&mut self, input: SequenceRx<T>, n: usize) -> SequenceRx<T>
    where
        T: Send + 'static,
    {
        let (output, rx) = sequence();
        let shutdown_rx = self.shutdown_tx.subscribe();

        self.stages.spawn(async move {
            let outcome = run_take(shutdown_rx, input, n, output).await;
            (StageKind::Take, Ok(outcome))
        });

        rx
    }

    /// Triggers the shutdown signal. Calling it more than once has no further effect.
    pub fn shutdown(&self) {
        if self.shutdown_tx.is_shutdown() {
            debug!("pipeline shutdown already requested");
            return;
        }

        info!("shutting down the pipeline");
        self.shutdown_tx.shutdown();
    }

    /// Waits for every stage to finish.
    ///
    /// A generator never finishes on its own, so this is normally preceded by
    /// [`Pipeline::shutdown`]; see [`Pipeline::shutdown_and_wait`]. Errors from failed or
    /// panicked stages are collected and returned together once all stages are joined.
    pub async fn wait(mut self) -> ConduitResult<()> {
        info!(stages = self.stages.len(), "waiting for pipeline stages to complete");

        let mut errors: Vec<ConduitError> = Vec::new();

        while let Some(result) = self.stages.join_next().await {
            match result {
                Ok((stage, Ok(outcome))) => {
                    debug!(
                        %stage,
                        emitted = outcome.emitted,
                        reason = %outcome.reason,
                        "stage completed"
                    );
                }
                Ok((stage, Err(err))) => {
                    error!(%stage, error = %err, "stage completed with error");
                    errors.push(err);
                }
                Err(join_err) => {
                    error!(error = %join_err, "stage task failed");
                    errors.push(join_err.into());
                }
            }
        }

        if !errors.is_empty() {
            info!("{} pipeline stages failed", errors.len());
            return Err(errors.into());
        }

        info!("all pipeline stages completed");

        Ok(())
    }

    /// Triggers shutdown and waits for every stage to finish.
    pub async fn shutdown_and_wait(self) -> ConduitResult<()> {
        self.shutdown();
        self.wait().await
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test(flavor = "multi_thread")]
    async fn composes_stages_and_joins_them() {
        let mut pipeline = Pipeline::new();

        let mut next = 0u64;
        let source = pipeline.generate(move || {
            next += 1;
            next
        });
        let filtered = pipeline.fan_out(source, 3, |n| n % 5 == 0).unwrap();
        let merged = pipeline.merge(filtered);
        let taken = pipeline.take(merged, 4);
        assert_eq!(pipeline.stage_count(), 6);

        let mut items = Vec::new();
        while let Some(item) = taken.recv().await {
            items.push(item);
        }
        assert_eq!(items.len(), 4);
        assert!(items.iter().all(|n| n % 5 == 0));

        timeout(Duration::from_secs(5), pipeline.shutdown_and_wait())
            .await
            .expect("stages did not stop after shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn zero_width_fan_out_is_rejected() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.generate(|| 1u8);

        let err = pipeline.fan_out(source, 0, |_| true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        pipeline.shutdown_and_wait().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_stages_are_reported() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.generate(|| 1u8);
        let filtered = pipeline
            .fan_out(source, 2, |_| panic!("predicate exploded"))
            .unwrap();
        let merged = pipeline.merge(filtered);

        // Both filter instances die, so the merged output closes without items.
        assert_eq!(merged.recv().await, None);

        let err = timeout(Duration::from_secs(5), pipeline.shutdown_and_wait())
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kinds(), vec![ErrorKind::StagePanic, ErrorKind::StagePanic]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dropping_the_pipeline_aborts_its_stages() {
        let mut pipeline = Pipeline::new();
        let source = pipeline.generate(|| 1u8);

        drop(pipeline);

        // An item already handed to the sequence may still come through before it closes.
        let drained = timeout(Duration::from_secs(5), async {
            let mut count = 0;
            while source.recv().await.is_some() {
                count += 1;
            }
            count
        })
        .await
        .expect("aborted generator left its output open");
        assert!(drained <= 1);
    }

    #[tokio::test]
    async fn repeated_shutdown_is_harmless() {
        let pipeline = Pipeline::new();
        let shutdown_tx = pipeline.shutdown_tx();

        pipeline.shutdown();
        pipeline.shutdown();
        assert!(shutdown_tx.is_shutdown());

        pipeline.wait().await.unwrap();
    }
}
