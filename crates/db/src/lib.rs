//! ladenetz-db – Ladepunkt-Repository
//!
//! Dieses Crate stellt das Repository bereit, in dem Ladepunkte mit ihren
//! Zugangsdaten liegen. Es gibt ein SQLite-Backend (Standard) und ein
//! In-Memory-Backend hinter derselben Schnittstelle.

pub mod error;
pub mod memory;
pub mod models;
pub mod repository;
pub mod sqlite;

pub use error::DbError;
pub use memory::MemoryRepository;
pub use models::{LadepunktRecord, LadepunktUpdate, NeuerLadepunkt};
pub use repository::{ChargePointRepository, DatabaseBackend, DatabaseConfig, DbResult};
pub use sqlite::SqliteDb;
