use tracing::debug;

use crate::concurrency::sequence::{SequenceRx, SequenceTx, sequence};
use crate::concurrency::shutdown::{ShutdownResult, ShutdownRx};
use crate::stages::{StageKind, StageOutcome, StopReason, finish};

/// Spawns a generator and returns its output sequence.
///
/// The generator calls `producer` once per item and hands each result to exactly one reader of
/// the returned sequence. The sequence is infinite: it closes only when shutdown fires or every
/// reader is dropped.
///
/// `producer` must not block indefinitely, since the generator only observes shutdown between
/// calls.
pub fn generate<T, F>(shutdown_rx: ShutdownRx, producer: F) -> SequenceRx<T>
where
    T: Send + 'static,
    F: FnMut() -> T + Send + 'static,
{
    let (output, rx) = sequence();
    tokio::spawn(run_generator(shutdown_rx, producer, output));

    rx
}

/// Runs the generator loop until shutdown or until nobody reads `output` anymore.
///
/// Each emission is raced against shutdown. When both are ready, shutdown wins, although an item
/// already offered to a reader may still be delivered.
pub async fn run_generator<T, F>(
    mut shutdown_rx: ShutdownRx,
    mut producer: F,
    output: SequenceTx<T>,
) -> StageOutcome
where
    F: FnMut() -> T,
{
    debug!(stage = %StageKind::Generator, "stage started");

    let mut emitted = 0;
    let reason = loop {
        let item = producer();

        match shutdown_rx.race(output.send(item)).await {
            ShutdownResult::Shutdown(()) => break StopReason::Shutdown,
            ShutdownResult::Ok(Err(_)) => break StopReason::OutputClosed,
            ShutdownResult::Ok(Ok(())) => emitted += 1,
        }
    };

    finish(StageKind::Generator, output, emitted, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn emits_producer_results_in_order() {
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let mut next = 0u32;
        let rx = generate(shutdown_rx, move || {
            next += 1;
            next
        });

        for expected in 1..=5 {
            assert_eq!(rx.recv().await, Some(expected));
        }
    }

    #[tokio::test]
    async fn closes_output_on_shutdown() {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let rx = generate(shutdown_rx, || 1u8);

        assert_eq!(rx.recv().await, Some(1));
        shutdown_tx.shutdown();

        // At most one item offered before the trigger may still come through.
        let drained = timeout(Duration::from_secs(1), async {
            let mut count = 0;
            while rx.recv().await.is_some() {
                count += 1;
            }
            count
        })
        .await
        .expect("generator did not close its output after shutdown");
        assert!(drained <= 1);
    }

    #[tokio::test]
    async fn stops_when_every_reader_is_gone() {
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let (output, rx) = sequence::<u8>();
        drop(rx);

        let outcome = timeout(
            Duration::from_secs(1),
            run_generator(shutdown_rx, || 3, output),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            StageOutcome {
                emitted: 0,
                reason: StopReason::OutputClosed
            }
        );
    }

    #[tokio::test]
    async fn stops_immediately_when_already_shut_down() {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        shutdown_tx.shutdown();
        let (output, _rx) = sequence::<u8>();

        let outcome = run_generator(shutdown_rx, || 3, output).await;

        assert_eq!(outcome.reason, StopReason::Shutdown);
        assert_eq!(outcome.emitted, 0);
    }
}
