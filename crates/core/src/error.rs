//! Error types for the synchronizer domain layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`DomainError`] - Business logic errors
//! - [`StorageError`] - Database/repository errors
//! - [`ChainError`] - Ledger RPC errors (the transient, retryable class)
//! - [`SyncError`] - Top-level poll supervisor errors
//! - [`ReconcileError`] - Reconciliation request errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Domain Errors
// =============================================================================

/// Business logic and domain rule violations.
///
/// These errors represent problems in the synchronizer's domain logic,
/// such as data validation failures or missing required data.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Escrow projection was not found in storage.
    #[error("Escrow not found: {0}")]
    EscrowNotFound(String),

    /// Event payload decoding/deserialization failed.
    #[error("Decoding error: {0}")]
    DecodingError(String),

    /// Generic validation error.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Database and repository errors.
///
/// These errors originate from storage operations like queries,
/// transactions, and data serialization.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to establish database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// SQL query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Database constraint was violated (unique, foreign key, etc.).
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// Data serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// =============================================================================
// Chain Errors
// =============================================================================

/// Ledger RPC and connectivity errors.
///
/// These errors occur when communicating with the Soroban RPC endpoint.
/// They are the single retryable class: the poll supervisor responds to
/// any of them with backoff, never with data mutation.
#[derive(Debug, Error)]
pub enum ChainError {
    /// HTTP connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// RPC request returned an error.
    #[error("RPC error: {0}")]
    RpcError(String),

    /// RPC response could not be decoded.
    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),

    /// Operation timed out waiting for the ledger.
    #[error("Timeout fetching ledger range {from}..={to}")]
    Timeout { from: u64, to: u64 },
}

// =============================================================================
// Sync Errors
// =============================================================================

/// Top-level poll supervisor errors.
///
/// This is the main error type returned by
/// [`crate::services::PollSupervisor`]. It wraps all lower-level errors
/// and adds supervisor-specific variants.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Domain logic error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Storage/database error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Ledger connectivity error.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Too many consecutive poll cycles failed.
    ///
    /// This is terminal: the loop has stopped and requires an explicit
    /// restart by an operator.
    #[error("Sync stopped after {attempts} consecutive failed cycles")]
    RetriesExhausted { attempts: u32 },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Reconcile Errors
// =============================================================================

/// Errors raised by the reconciliation surface.
///
/// The request-shaped variants are caller errors rejected before any
/// lookup starts; they must never be retried by the supervisor.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Range request with `from_id` greater than `to_id`.
    #[error("Invalid id range: from {from} to {to}")]
    InvalidRange { from: u64, to: u64 },

    /// Request resolves to more ids than the configured cap.
    #[error("Too many escrows requested: {requested} (max {max})")]
    TooManyTargets { requested: usize, max: usize },

    /// Storage error outside the per-id isolation boundary.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for supervisor operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for ledger operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    // Test critique: la chaîne de conversion d'erreurs fonctionne
    // Permet d'utiliser ? à travers les couches
    #[test]
    fn test_error_conversion_chain() {
        // Storage -> Domain -> Sync
        let storage_err = StorageError::QueryError("db failed".into());
        let domain_err: DomainError = storage_err.into();
        let sync_err: SyncError = domain_err.into();

        // Le message original est préservé
        assert!(sync_err.to_string().contains("db failed"));

        // Chain -> Sync
        let chain_err = ChainError::RpcError("rpc failed".into());
        let sync_err: SyncError = chain_err.into();
        assert!(sync_err.to_string().contains("rpc failed"));
    }

    // Test critique: l'erreur terminale expose le nombre de tentatives
    #[test]
    fn test_retries_exhausted_includes_attempts() {
        let err = SyncError::RetriesExhausted { attempts: 5 };
        assert!(err.to_string().contains('5'));
    }
}
