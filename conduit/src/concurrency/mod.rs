//! Concurrency primitives the pipeline stages are built on.
//!
//! Stages coordinate exclusively through two primitives:
//!
//! - [`shutdown`]: a broadcast, single-shot cancellation signal observed by every stage. Each
//!   stage races its blocking operations against it and stops at its next suspension point once
//!   it fires.
//! - [`sequence`]: unbuffered rendezvous channels with a single owning writer and any number of
//!   competing readers. A sequence closes exactly when its writer is done.
//!
//! No stage holds a lock across stages. Ordering is preserved only along a single
//! writer-to-reader edge.

pub mod sequence;
pub mod shutdown;
