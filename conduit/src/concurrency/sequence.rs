//! Unbuffered, ownership-transferring sequences connecting pipeline stages.
//!
//! A sequence is a rendezvous channel: [`SequenceTx::send`] completes only once a reader has taken
//! the item. It is built from a capacity-one tokio mpsc slot paired with a oneshot acknowledgement
//! per item, so a producer never runs ahead of its consumers by more than the item being handed
//! off.
//!
//! The write side is single-owner and closes the sequence when closed or dropped. The read side is
//! cloneable: clones share one receiver, and each item is delivered to exactly one of them.

use std::fmt;
use std::sync::Arc;

use futures::Stream;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, oneshot};

/// An item in flight together with the acknowledgement its sender waits for.
#[derive(Debug)]
struct Handoff<T> {
    item: T,
    ack_tx: oneshot::Sender<()>,
}

/// Error returned by [`SequenceTx::send`] when no reader can take the item anymore.
#[derive(Error)]
pub enum SendError<T> {
    /// Every reader was dropped before the item entered the sequence. The item is returned.
    #[error("sequence has no readers left")]
    Closed(T),
    /// Every reader was dropped after the item entered the sequence but before it was taken.
    #[error("sequence readers left before taking the item")]
    Abandoned,
}

impl<T> SendError<T> {
    /// Returns the item if it never left the sender.
    pub fn into_inner(self) -> Option<T> {
        match self {
            SendError::Closed(item) => Some(item),
            SendError::Abandoned => None,
        }
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Closed(_) => f.write_str("Closed(..)"),
            SendError::Abandoned => f.write_str("Abandoned"),
        }
    }
}

/// Write side of a sequence.
///
/// There is exactly one [`SequenceTx`] per sequence, and only its owner can close it.
#[derive(Debug)]
pub struct SequenceTx<T> {
    tx: mpsc::Sender<Handoff<T>>,
}

impl<T> SequenceTx<T> {
    /// Hands `item` to one reader, waiting until a reader has taken it.
    ///
    /// The future is safe to race against shutdown. If it is dropped after the item entered the
    /// sequence, a reader may still receive that item.
    pub async fn send(&self, item: T) -> Result<(), SendError<T>> {
        let permit = match self.tx.reserve().await {
            Ok(permit) => permit,
            Err(_) => return Err(SendError::Closed(item)),
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        permit.send(Handoff { item, ack_tx });

        ack_rx.await.map_err(|_| SendError::Abandoned)
    }

    /// Returns `true` when every reader of this sequence was dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Closes the sequence. Readers drain nothing further and then observe the end.
    pub fn close(self) {
        drop(self);
    }

    /// Creates an additional write handle feeding the same sequence.
    ///
    /// Only the merger uses this, to let its drain tasks forward into one output. The sequence
    /// closes once every handle is gone, so the merge joiner keeps the original handle and closes
    /// it after all drains finished.
    pub(crate) fn share(&self) -> SequenceTx<T> {
        SequenceTx {
            tx: self.tx.clone(),
        }
    }
}

/// Read side of a sequence.
///
/// Cloning a [`SequenceRx`] creates a competing reader: every item goes to exactly one of them,
/// first come first served.
#[derive(Debug)]
pub struct SequenceRx<T> {
    rx: Arc<Mutex<mpsc::Receiver<Handoff<T>>>>,
}

impl<T> Clone for SequenceRx<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T> SequenceRx<T> {
    /// Receives the next item, or `None` once the sequence is closed and drained.
    ///
    /// The future is cancel safe: if it is dropped before returning, no item is lost.
    pub async fn recv(&self) -> Option<T> {
        let mut rx = self.rx.lock().await;
        let Handoff { item, ack_tx } = rx.recv().await?;

        // The sender may have been cancelled while waiting, the item is ours regardless.
        let _ = ack_tx.send(());

        Some(item)
    }

    /// Converts this reader into a [`Stream`] of items.
    pub fn into_stream(self) -> impl Stream<Item = T> {
        futures::stream::unfold(self, |rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        })
    }
}

/// Creates a new sequence.
pub fn sequence<T>() -> (SequenceTx<T>, SequenceRx<T>) {
    let (tx, rx) = mpsc::channel(1);
    (
        SequenceTx { tx },
        SequenceRx {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn send_waits_for_a_reader() {
        let (tx, rx) = sequence::<u32>();

        let send = tokio::spawn(async move { tx.send(7).await.is_ok() });

        // Without a reader the handoff cannot complete.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!send.is_finished());

        assert_eq!(rx.recv().await, Some(7));
        assert!(send.await.unwrap());
    }

    #[tokio::test]
    async fn close_ends_the_sequence() {
        let (tx, rx) = sequence::<u32>();

        let producer = tokio::spawn(async move {
            tx.send(1).await.unwrap();
            tx.send(2).await.unwrap();
            tx.close();
        });

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, None);
        assert_eq!(rx.recv().await, None);
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn send_without_readers_returns_the_item() {
        let (tx, rx) = sequence::<String>();
        drop(rx);

        assert!(tx.is_closed());
        let err = tx.send("lost".to_owned()).await.unwrap_err();
        assert_eq!(err.into_inner().as_deref(), Some("lost"));
    }

    #[tokio::test]
    async fn competing_readers_never_share_an_item() {
        let (tx, rx) = sequence::<u64>();
        let total = 500u64;

        let producer = tokio::spawn(async move {
            for i in 0..total {
                tx.send(i).await.unwrap();
            }
        });

        let readers = (0..4)
            .map(|_| {
                let rx = rx.clone();
                tokio::spawn(async move {
                    let mut seen = Vec::new();
                    while let Some(item) = rx.recv().await {
                        seen.push(item);
                    }
                    seen
                })
            })
            .collect::<Vec<_>>();
        drop(rx);

        let mut all = Vec::new();
        for reader in readers {
            all.extend(timeout(Duration::from_secs(5), reader).await.unwrap().unwrap());
        }
        producer.await.unwrap();

        let unique = all.iter().copied().collect::<HashSet<_>>();
        assert_eq!(all.len() as u64, total);
        assert_eq!(unique.len() as u64, total);
    }

    #[tokio::test]
    async fn stream_yields_until_closed() {
        let (tx, rx) = sequence::<u8>();

        tokio::spawn(async move {
            for i in 0..3 {
                tx.send(i).await.unwrap();
            }
        });

        let items = rx.into_stream().collect::<Vec<_>>().await;
        assert_eq!(items, vec![0, 1, 2]);
    }
}
