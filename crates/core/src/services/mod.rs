//! Core business logic services.
//!
//! - [`normalizer`] - raw event classification and field extraction
//! - [`applier`] - the escrow lifecycle state machine
//! - [`supervisor`] - the ledger poll loop
//! - [`reconciler`] - store-vs-ledger consistency checking

pub mod applier;
pub mod normalizer;
pub mod reconciler;
pub mod supervisor;

pub use applier::{ApplyOutcome, EventApplier};
pub use normalizer::normalize;
pub use reconciler::{ReconcileConfig, ReconciliationEngine};
pub use supervisor::{PollConfig, PollSupervisor};

#[cfg(test)]
pub(crate) mod testing;
