use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::concurrency::sequence::{SequenceRx, SequenceTx, sequence};
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ConduitError, ConduitResult};
use crate::stages::{StageKind, StageOutcome, StopReason, finish, forward};

/// Spawns a merger combining `inputs` into one output sequence.
///
/// Every item read from any input is forwarded exactly once. Items of one input keep their
/// relative order; interleaving across inputs is arbitrary. The output closes once every input has
/// been drained, or every drain has observed shutdown.
///
/// An input that never closes keeps the merger alive until shutdown fires.
pub fn merge<T>(shutdown_rx: ShutdownRx, inputs: Vec<SequenceRx<T>>) -> SequenceRx<T>
where
    T: Send + 'static,
{
    let (output, rx) = sequence();
    tokio::spawn(async move {
        if let Err(err) = run_merge(shutdown_rx, inputs, output).await {
            error!(error = %err, "merger finished with failed drains");
        }
    });

    rx
}

/// Runs the merger: one drain task per input, joined before the output is closed.
///
/// The drains live in a [`JoinSet`] acting as the merge group's wait group. Drains that panic are
/// reported as errors once the group is empty; the output is closed either way.
pub async fn run_merge<T>(
    shutdown_rx: ShutdownRx,
    inputs: Vec<SequenceRx<T>>,
    output: SequenceTx<T>,
) -> ConduitResult<StageOutcome>
where
    T: Send + 'static,
{
    let mut drains = JoinSet::new();
    for (index, input) in inputs.into_iter().enumerate() {
        drains.spawn(run_drain(index, shutdown_rx.clone(), input, output.share()));
    }

    debug!(stage = %StageKind::MergeJoin, inputs = drains.len(), "stage started");

    let mut forwarded = 0;
    let mut reason = StopReason::InputExhausted;
    let mut errors: Vec<ConduitError> = Vec::new();

    while let Some(result) = drains.join_next().await {
        match result {
            Ok(outcome) => {
                forwarded += outcome.emitted;
                reason = merge_reason(reason, outcome.reason);
            }
            Err(err) => {
                error!(error = %err, "merge drain task failed");
                errors.push(err.into());
            }
        }
    }

    let outcome = finish(StageKind::MergeJoin, output, forwarded, reason);

    if !errors.is_empty() {
        return Err(errors.into());
    }

    Ok(outcome)
}

/// Forwards every item of one input into the shared merged output.
async fn run_drain<T>(
    index: usize,
    mut shutdown_rx: ShutdownRx,
    input: SequenceRx<T>,
    output: SequenceTx<T>,
) -> StageOutcome {
    let kind = StageKind::MergeDrain { index };
    debug!(stage = %kind, "stage started");

    let (emitted, reason) = forward(&mut shutdown_rx, &input, &output, |_| true, None).await;

    finish(kind, output, emitted, reason)
}

/// Picks the reason reported for the whole merge group.
///
/// Shutdown dominates, then a vanished reader, then plain exhaustion of all inputs.
fn merge_reason(current: StopReason, drained: StopReason) -> StopReason {
    match (current, drained) {
        (StopReason::Shutdown, _) | (_, StopReason::Shutdown) => StopReason::Shutdown,
        (StopReason::OutputClosed, _) | (_, StopReason::OutputClosed) => StopReason::OutputClosed,
        _ => StopReason::InputExhausted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use std::time::Duration;
    use tokio::time::timeout;

    fn finite(items: Vec<u32>) -> SequenceRx<u32> {
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
    async fn zero_inputs_close_immediately() {
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let rx = merge::<u32>(shutdown_rx, Vec::new());

        let next = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(next, None);
    }

    #[tokio::test]
    async fn preserves_per_input_order() {
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let first = finite(vec![1, 2, 3, 4]);
        let second = finite(vec![10, 20, 30]);

        let rx = merge(shutdown_rx, vec![first, second]);

        let mut merged = Vec::new();
        while let Some(item) = rx.recv().await {
            merged.push(item);
        }

        let small = merged.iter().copied().filter(|n| *n < 10).collect::<Vec<_>>();
        let large = merged.iter().copied().filter(|n| *n >= 10).collect::<Vec<_>>();
        assert_eq!(small, vec![1, 2, 3, 4]);
        assert_eq!(large, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn shutdown_closes_output_despite_open_inputs() {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let (_never_closed_tx, never_closed) = sequence::<u32>();
        let (output, rx) = sequence();

        let merger = tokio::spawn(run_merge(shutdown_rx, vec![never_closed], output));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!merger.is_finished());
        shutdown_tx.shutdown();

        let outcome = timeout(Duration::from_secs(1), merger)
            .await
            .expect("merger did not stop after shutdown")
            .unwrap()
            .unwrap();
        assert_eq!(outcome.reason, StopReason::Shutdown);
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn shutdown_dominates_group_reason() {
        assert_eq!(
            merge_reason(StopReason::InputExhausted, StopReason::Shutdown),
            StopReason::Shutdown
        );
        assert_eq!(
            merge_reason(StopReason::OutputClosed, StopReason::InputExhausted),
            StopReason::OutputClosed
        );
        assert_eq!(
            merge_reason(StopReason::InputExhausted, StopReason::InputExhausted),
            StopReason::InputExhausted
        );
    }
}
