//! Soroban RPC adapter for the Concord escrow synchronizer.
//!
//! This crate implements the [`LedgerSource`] port from `concord-core`,
//! providing connectivity to a Stellar Soroban RPC endpoint over HTTP
//! JSON-RPC.
//!
//! # Features
//!
//! - Ledger head via `getLatestLedger`
//! - Contract event fetching over inclusive ledger ranges via `getEvents`,
//!   with transparent pagination
//! - Escrow contract storage reads via `getLedgerEntries`
//! - All payloads requested with `xdrFormat: "json"`, so no XDR decoding
//!   happens client-side
//!
//! # Usage
//!
//! ```ignore
//! use concord_soroban::{SorobanClient, SorobanClientConfig};
//!
//! let config = SorobanClientConfig {
//!     rpc_url: "https://soroban-testnet.stellar.org".to_string(),
//!     contract_id: "CCR6QKTWZQYW6YUJ7UP7XXZRLWQPFRV6SWBLQS4ZQOSAF4BOUD77OTE2".to_string(),
//! };
//!
//! let client = SorobanClient::new(config)?;
//! let head = client.head().await?;
//! let events = client.fetch_range(head - 10, head).await?;
//! ```
//!
//! [`LedgerSource`]: concord_core::ports::LedgerSource

mod client;

pub use client::{SorobanClient, SorobanClientConfig};
