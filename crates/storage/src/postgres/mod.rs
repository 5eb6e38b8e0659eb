//! PostgreSQL storage adapter.
//!
//! This module implements the repository traits defined in `concord-core`
//! using PostgreSQL as the backing store.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool and migrations
//! - [`PgRepositories`] - Composite repository implementing `Repositories`
//! - Individual repos: `PgEventRepository`, `PgProjectionRepository`,
//!   `PgCursorRepository`

mod cursor_repo;
mod database;
mod event_repo;
mod projection_repo;

pub use cursor_repo::PgCursorRepository;
pub use database::{Database, DatabaseConfig, PurgeStats};
pub use event_repo::PgEventRepository;
pub use projection_repo::PgProjectionRepository;

use std::sync::Arc;

use concord_core::ports::{
    CursorRepository, EventRepository, ProjectionRepository, Repositories,
};

/// Aggregated PostgreSQL repositories implementing the `Repositories` trait.
///
/// The cursor is keyed by the escrow contract id, so one database can hold
/// sync state for several contracts without the cursors clobbering each
/// other.
pub struct PgRepositories {
    events: PgEventRepository,
    projections: PgProjectionRepository,
    cursor: PgCursorRepository,
}

impl PgRepositories {
    /// Create a new repository aggregate from a database connection.
    pub fn new(db: Arc<Database>, contract_id: &str) -> Self {
        Self {
            events: PgEventRepository::new(db.pool().clone()),
            projections: PgProjectionRepository::new(db.pool().clone()),
            cursor: PgCursorRepository::new(db.pool().clone(), contract_id),
        }
    }
}

impl Repositories for PgRepositories {
    fn events(&self) -> &dyn EventRepository {
        &self.events
    }

    fn projections(&self) -> &dyn ProjectionRepository {
        &self.projections
    }

    fn cursor(&self) -> &dyn CursorRepository {
        &self.cursor
    }
}
