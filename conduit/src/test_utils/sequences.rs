use crate::concurrency::sequence::{SequenceRx, sequence};
use crate::concurrency::shutdown::{ShutdownResult, ShutdownRx};

/// Returns a producer cycling endlessly through `items`.
///
/// # Panics
///
/// Panics if `items` is empty.
pub fn cycle<T>(items: Vec<T>) -> impl FnMut() -> T + Send + 'static
where
    T: Clone + Send + 'static,
{
    assert!(!items.is_empty(), "cannot cycle through an empty list");

    let mut position = 0;
    move || {
        let item = items[position].clone();
        position = (position + 1) % items.len();
        item
    }
}

/// Spawns a writer emitting `items` in order and then closing the returned sequence.
///
/// The writer also stops early when shutdown fires or every reader is gone.
pub fn finite_sequence<T>(mut shutdown_rx: ShutdownRx, items: Vec<T>) -> SequenceRx<T>
where
    T: Send + 'static,
{
    let (tx, rx) = sequence();

    tokio::spawn(async move {
        for item in items {
            match shutdown_rx.race(tx.send(item)).await {
                ShutdownResult::Ok(Ok(())) => {}
                _ => break,
            }
        }

        tx.close();
    });

    rx
}
