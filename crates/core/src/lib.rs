//! Core domain layer for the Concord escrow synchronizer.
//!
//! This crate contains the domain models, port traits (interfaces), and
//! business logic services that keep an off-chain escrow projection in
//! sync with a Soroban escrow contract. It follows hexagonal architecture
//! principles - this is the innermost layer with no dependencies on
//! infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   concord (binary)                      │
//! ├────────────────────────────┬────────────────────────────┤
//! │      concord-soroban       │       concord-storage      │
//! │        (ledger RPC)        │        (PostgreSQL)        │
//! ├────────────────────────────┴────────────────────────────┤
//! │               concord-core  ← YOU ARE HERE              │
//! │                (models, ports, services)                │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Domain models (LedgerEvent, EscrowProjection, reports)
//! - [`ports`] - Interface traits for adapters to implement
//! - [`services`] - Core business logic (poller, applier, reconciler)
//! - [`error`] - Domain error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Key Concepts
//!
//! ## Ports
//!
//! Ports define interfaces that external adapters must implement:
//!
//! - [`ports::LedgerSource`] - Read ledger head, events and escrow state
//! - [`ports::Repositories`] - Persist and query the local projection
//!
//! ## Sync Lifecycle
//!
//! 1. Resolve the cursor from storage (or the configured start ledger)
//! 2. Read the ledger head and partition the pending range into batches
//! 3. Fetch, normalize and apply each batch's events idempotently
//! 4. Persist the cursor after each durably applied batch
//! 5. Back off on failure; stop permanently after too many in a row
//!
//! ## Reconciliation
//!
//! [`services::ReconciliationEngine`] independently resolves the stored
//! and ledger-side view of each requested escrow and reports field-level
//! divergence. It never mutates either side.

pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;
