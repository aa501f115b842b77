use tracing::debug;

use crate::concurrency::sequence::{SequenceRx, SequenceTx, sequence};
use crate::concurrency::shutdown::ShutdownRx;
use crate::stages::{StageKind, StageOutcome, finish, forward};

/// Spawns a bounded consumer forwarding at most `n` items of `input`.
///
/// The returned sequence yields `n` items and closes. It closes earlier with fewer items when
/// shutdown fires, or when `input` closes before producing `n` items. Until one of these happens
/// the consumer waits on `input` indefinitely.
pub fn take<T>(shutdown_rx: ShutdownRx, input: SequenceRx<T>, n: usize) -> SequenceRx<T>
where
    T: Send + 'static,
{
    let (output, rx) = sequence();
    tokio::spawn(run_take(shutdown_rx, input, n, output));

    rx
}

/// Runs the bounded consumer.
pub async fn run_take<T>(
    mut shutdown_rx: ShutdownRx,
    input: SequenceRx<T>,
    n: usize,
    output: SequenceTx<T>,
) -> StageOutcome {
    debug!(stage = %StageKind::Take, limit = n, "stage started");

    let (emitted, reason) =
        forward(&mut shutdown_rx, &input, &output, |_| true, Some(n as u64)).await;

    finish(StageKind::Take, output, emitted, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::stages::{StopReason, generate};
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn yields_exactly_n_items_then_closes() {
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let source = generate(shutdown_rx.clone(), || 'x');

        let rx = take(shutdown_rx, source, 3);

        for _ in 0..3 {
            assert_eq!(rx.recv().await, Some('x'));
        }
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn zero_closes_without_reading() {
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let (_input_tx, input) = sequence::<u8>();
        let (output, _rx) = sequence();

        let outcome = run_take(shutdown_rx, input, 0, output).await;

        assert_eq!(
            outcome,
            StageOutcome {
                emitted: 0,
                reason: StopReason::Completed
            }
        );
    }

    #[tokio::test]
    async fn short_input_closes_early() {
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let (input_tx, input) = sequence::<u8>();
        tokio::spawn(async move {
            input_tx.send(1).await.unwrap();
            input_tx.send(2).await.unwrap();
        });

        let rx = take(shutdown_rx, input, 5);

        let mut items = Vec::new();
        while let Some(item) = timeout(Duration::from_secs(1), rx.recv()).await.unwrap() {
            items.push(item);
        }
        assert_eq!(items, vec![1, 2]);
    }

    #[tokio::test]
    async fn shutdown_releases_a_waiting_read() {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let (_silent_tx, input) = sequence::<u8>();
        let (output, _rx) = sequence();

        let consumer = tokio::spawn(run_take(shutdown_rx, input, 2, output));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        shutdown_tx.shutdown();

        let outcome = timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.reason, StopReason::Shutdown);
        assert_eq!(outcome.emitted, 0);
    }
}
