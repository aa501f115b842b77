use std::fmt;
use std::time::Duration;

use tokio::time::timeout;

use crate::concurrency::sequence::SequenceRx;

/// Default time a test waits for a sequence to close.
///
/// Stages in tests exchange a handful of items, so anything slower than this is a hang.
pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Returned when a sequence did not close in time, carrying the items read until then.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedOut<T> {
    pub collected: Vec<T>,
    pub waited: Duration,
}

impl<T> fmt::Display for TimedOut<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sequence still open after {:?} ({} items read)",
            self.waited,
            self.collected.len()
        )
    }
}

/// Reads `rx` until it closes.
///
/// # Panics
///
/// Panics if the sequence is still open after [`DEFAULT_COLLECT_TIMEOUT`]. Tests fail fast
/// instead of hanging.
pub async fn collect_all<T>(rx: &SequenceRx<T>) -> Vec<T> {
    match collect_with_timeout(rx, DEFAULT_COLLECT_TIMEOUT).await {
        Ok(items) => items,
        Err(timed_out) => panic!(
            "{timed_out}. This likely indicates a stage never observed shutdown or its input never closed."
        ),
    }
}

/// Reads `rx` until it closes or `waited` elapses.
///
/// Returns [`TimedOut`] with the items read so far when the sequence stays open. Tests asserting
/// that a pipeline blocks use this as their external watchdog.
pub async fn collect_with_timeout<T>(
    rx: &SequenceRx<T>,
    waited: Duration,
) -> Result<Vec<T>, TimedOut<T>> {
    let mut collected = Vec::new();

    let drained = timeout(waited, async {
        while let Some(item) = rx.recv().await {
            collected.push(item);
        }
    })
    .await;

    match drained {
        Ok(()) => Ok(collected),
        Err(_) => Err(TimedOut { collected, waited }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::sequence::sequence;

    #[tokio::test]
    async fn reports_items_read_before_the_timeout() {
        let (tx, rx) = sequence();
        tokio::spawn(async move {
            tx.send(5u8).await.unwrap();
            // Keep the sequence open without sending anything else.
            std::future::pending::<()>().await;
        });

        let err = collect_with_timeout(&rx, Duration::from_millis(50))
            .await
            .unwrap_err();

        assert_eq!(err.collected, vec![5]);
    }
}
