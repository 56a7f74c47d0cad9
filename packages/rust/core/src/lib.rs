//! Core reconciliation logic for rosterboard.
//!
//! This crate ties roster aggregation, change detection, and publication
//! lifecycle management into the end-to-end `reconcile` run.

pub mod aggregate;
pub mod detect;
pub mod pipeline;
pub mod publish;

#[cfg(test)]
mod testutil;

pub use aggregate::aggregate;
pub use detect::detect;
pub use pipeline::{
    ProgressReporter, ReconcileConfig, ReconcileResult, SilentProgress, reconcile,
};
pub use publish::{PublishOutcome, PublishedState, Publisher};
