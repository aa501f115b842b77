use std::sync::Arc;

use tracing::debug;

use crate::bail;
use crate::concurrency::sequence::{SequenceRx, SequenceTx, sequence};
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ConduitResult, ErrorKind};
use crate::stages::{StageKind, StageOutcome, finish, forward};

/// Spawns one filter instance and returns its output sequence.
///
/// The filter reads `input` and re-emits only the items for which `predicate` holds. It closes its
/// output on shutdown, when `input` is exhausted, or when nobody reads the output anymore.
///
/// A standalone filter always logs as `filter-0`. Use [`fan_out`] for several instances that can
/// be told apart in logs, or [`run_filter`] to pick the index.
pub fn filter<T, P>(shutdown_rx: ShutdownRx, input: SequenceRx<T>, predicate: P) -> SequenceRx<T>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + 'static,
{
    let (output, rx) = sequence();
    tokio::spawn(run_filter(0, shutdown_rx, input, predicate, output));

    rx
}

/// Spawns `workers` filter instances all reading the same `input`.
///
/// Items of `input` are distributed first come first served: each one reaches exactly one
/// instance. The returned sequences are meant to be merged back with [`crate::stages::merge`].
pub fn fan_out<T, P>(
    shutdown_rx: ShutdownRx,
    input: SequenceRx<T>,
    workers: usize,
    predicate: P,
) -> ConduitResult<Vec<SequenceRx<T>>>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    let outputs = replicate_predicate(predicate, workers)?
        .into_iter()
        .enumerate()
        .map(|(index, predicate)| {
            let (output, rx) = sequence();
            tokio::spawn(run_filter(
                index,
                shutdown_rx.clone(),
                input.clone(),
                predicate,
                output,
            ));

            rx
        })
        .collect();

    Ok(outputs)
}

/// Runs one filter instance.
///
/// Passing items are handed off with the write raced against shutdown, so an instance never stays
/// blocked on a consumer that stopped reading.
pub async fn run_filter<T, P>(
    index: usize,
    mut shutdown_rx: ShutdownRx,
    input: SequenceRx<T>,
    predicate: P,
    output: SequenceTx<T>,
) -> StageOutcome
where
    P: Fn(&T) -> bool,
{
    let kind = StageKind::Filter { index };
    debug!(stage = %kind, "stage started");

    let (emitted, reason) = forward(&mut shutdown_rx, &input, &output, predicate, None).await;

    finish(kind, output, emitted, reason)
}

/// Builds one predicate handle per pool worker, all sharing `predicate`.
pub(crate) fn replicate_predicate<T, P>(
    predicate: P,
    workers: usize,
) -> ConduitResult<Vec<impl Fn(&T) -> bool + Send + 'static>>
where
    T: 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    if workers == 0 {
        bail!(
            ErrorKind::InvalidConfig,
            "Invalid fan-out width",
            "a filter pool needs at least one worker"
        );
    }

    let predicate = Arc::new(predicate);
    let handles = (0..workers)
        .map(|_| {
            let predicate = predicate.clone();
            move |item: &T| predicate(item)
        })
        .collect();

    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::stages::StopReason;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn feed<T: Send + 'static>(items: Vec<T>) -> SequenceRx<T> {
        let (tx, rx) = sequence();
        tokio::spawn(async move {
            for item in items {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        rx
    }

    #[tokio::test]
    async fn keeps_only_matching_items() {
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let input = feed((1..=10).collect::<Vec<u32>>()).await;

        let rx = filter(shutdown_rx, input, |n| n % 3 == 0);

        let mut kept = Vec::new();
        while let Some(n) = rx.recv().await {
            kept.push(n);
        }
        assert_eq!(kept, vec![3, 6, 9]);
    }

    #[tokio::test]
    async fn exhausted_input_closes_output() {
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let input = feed(Vec::<u32>::new()).await;
        let (output, _rx) = sequence();

        let outcome = run_filter(0, shutdown_rx, input, |_| true, output).await;

        assert_eq!(outcome.reason, StopReason::InputExhausted);
        assert_eq!(outcome.emitted, 0);
    }

    #[tokio::test]
    async fn blocked_emit_is_released_by_shutdown() {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let input = feed(vec![1u32, 2, 3]).await;

        // The output reader exists but never reads.
        let (output, _idle_reader) = sequence();
        let stage = tokio::spawn(run_filter(0, shutdown_rx, input, |_| true, output));

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.shutdown();

        let outcome = timeout(Duration::from_secs(1), stage)
            .await
            .expect("filter stayed blocked on its output after shutdown")
            .unwrap();
        assert_eq!(outcome.reason, StopReason::Shutdown);
    }

    #[tokio::test]
    async fn fan_out_rejects_zero_workers() {
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let (_tx, input) = sequence::<u32>();

        let err = fan_out(shutdown_rx, input, 0, |_| true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[tokio::test]
    async fn fan_out_spawns_one_output_per_worker() {
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let input = feed((0..40).collect::<Vec<u32>>()).await;

        let outputs = fan_out(shutdown_rx, input, 4, |n| n % 2 == 0).unwrap();
        assert_eq!(outputs.len(), 4);

        let mut kept = Vec::new();
        for output in outputs {
            let collector = tokio::spawn(async move {
                let mut items = Vec::new();
                while let Some(item) = output.recv().await {
                    items.push(item);
                }
                items
            });
            kept.push(collector);
        }

        let mut all = Vec::new();
        for collector in kept {
            all.extend(timeout(Duration::from_secs(5), collector).await.unwrap().unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..40).filter(|n| n % 2 == 0).collect::<Vec<_>>());
    }
}
