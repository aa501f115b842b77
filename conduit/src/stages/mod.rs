//! Pipeline stages.
//!
//! Each stage is exposed twice: as a spawning function returning the stage's output sequence
//! ([`generate`], [`filter`], [`fan_out`], [`merge`], [`take`]), and as a `run_*` body future that
//! [`crate::pipeline::Pipeline`] spawns on its own tracked task set. The spawning functions detach
//! their tasks; a detached stage ends when the shutdown signal fires or its input closes.
//!
//! Every stage owns the output sequence it creates and closes it when, and only when, it will emit
//! no further items.

use std::fmt;

use tracing::debug;

use crate::concurrency::sequence::{SequenceRx, SequenceTx};
use crate::concurrency::shutdown::{ShutdownResult, ShutdownRx};

pub mod filter;
pub mod generate;
pub mod merge;
pub mod take;

pub use filter::{fan_out, filter};
pub use generate::generate;
pub use merge::merge;
pub use take::take;

/// Identifies a stage task for logging and error reporting.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Stage repeatedly invoking a producer function.
    Generator,
    /// One instance of the fan-out filter pool.
    Filter {
        /// Position of the instance in the pool.
        index: usize,
    },
    /// Task forwarding one merger input into the merged output.
    MergeDrain {
        /// Position of the input in the merged set.
        index: usize,
    },
    /// Task closing the merged output once every drain finished.
    MergeJoin,
    /// Bounded consumer.
    Take,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Generator => write!(f, "generator"),
            StageKind::Filter { index } => write!(f, "filter-{index}"),
            StageKind::MergeDrain { index } => write!(f, "merge-drain-{index}"),
            StageKind::MergeJoin => write!(f, "merge-join"),
            StageKind::Take => write!(f, "take"),
        }
    }
}

/// Why a stage stopped.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The shutdown signal was observed.
    Shutdown,
    /// The input sequence was closed and drained.
    InputExhausted,
    /// Every reader of the output sequence went away.
    OutputClosed,
    /// The stage emitted everything it was asked for.
    Completed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Shutdown => write!(f, "shutdown"),
            StopReason::InputExhausted => write!(f, "input exhausted"),
            StopReason::OutputClosed => write!(f, "output closed"),
            StopReason::Completed => write!(f, "completed"),
        }
    }
}

/// Summary returned by a finished stage body.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    /// Number of items the stage handed to its output.
    pub emitted: u64,
    /// Why the stage stopped.
    pub reason: StopReason,
}

/// Moves items from `input` to `output` until shutdown, exhaustion of either side, or `limit`.
///
/// Items rejected by `keep` are dropped. Both the read and the write are raced against the
/// shutdown signal, so a stage never stays blocked on a peer once shutdown fired.
async fn forward<T, P>(
    shutdown_rx: &mut ShutdownRx,
    input: &SequenceRx<T>,
    output: &SequenceTx<T>,
    keep: P,
    limit: Option<u64>,
) -> (u64, StopReason)
where
    P: Fn(&T) -> bool,
{
    let mut emitted = 0;

    loop {
        if limit.is_some_and(|limit| emitted >= limit) {
            return (emitted, StopReason::Completed);
        }

        let item = match shutdown_rx.race(input.recv()).await {
            ShutdownResult::Shutdown(()) => return (emitted, StopReason::Shutdown),
            ShutdownResult::Ok(None) => return (emitted, StopReason::InputExhausted),
            ShutdownResult::Ok(Some(item)) => item,
        };

        if !keep(&item) {
            continue;
        }

        match shutdown_rx.race(output.send(item)).await {
            ShutdownResult::Shutdown(()) => return (emitted, StopReason::Shutdown),
            ShutdownResult::Ok(Err(_)) => return (emitted, StopReason::OutputClosed),
            ShutdownResult::Ok(Ok(())) => emitted += 1,
        }
    }
}

/// Closes the stage output and logs how the stage ended.
fn finish<T>(
    kind: StageKind,
    output: SequenceTx<T>,
    emitted: u64,
    reason: StopReason,
) -> StageOutcome {
    output.close();

    debug!(stage = %kind, emitted, %reason, "stage stopped");

    StageOutcome { emitted, reason }
}
