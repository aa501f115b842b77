//! Cancellable fan-out/fan-in pipelines on top of tokio.
//!
//! A pipeline is a generator feeding a pool of filter instances, whose outputs are merged back
//! into one sequence and capped by a bounded consumer. Every stage observes one shared shutdown
//! signal; see [`concurrency`] for the primitives, [`stages`] for the stage functions, and
//! [`pipeline::Pipeline`] for a composer that tracks and joins the stage tasks.

pub mod concurrency;
pub mod error;
mod macros;
pub mod pipeline;
pub mod stages;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
