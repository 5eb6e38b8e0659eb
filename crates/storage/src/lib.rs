//! Storage layer for the Concord escrow synchronizer.
//!
//! This crate provides PostgreSQL implementations of the repository traits
//! defined in `concord-core`. It handles all database interactions including
//! connection pooling, migrations, and CRUD operations.
//!
//! # Architecture
//!
//! The storage layer follows the repository pattern:
//!
//! - [`postgres::Database`] - Connection pool management
//! - [`postgres::PgRepositories`] - Composite repository for all entity types
//! - Individual repositories for the event log, projections, and cursor
//!
//! # Usage
//!
//! ```ignore
//! use concord_storage::{Database, DatabaseConfig, PgRepositories};
//!
//! // Connect to the database
//! let config = DatabaseConfig::from_env();
//! let db = Database::connect(&config).await?;
//!
//! // Run migrations
//! db.migrate().await?;
//!
//! // Create repositories, keyed by the escrow contract id
//! let repositories = Arc::new(PgRepositories::new(Arc::new(db), contract_id));
//! ```

pub mod postgres;

pub use postgres::{Database, DatabaseConfig, PgRepositories, PurgeStats};
