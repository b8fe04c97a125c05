//! SQLite-Backend fuer das Ladepunkt-Repository

pub mod charge_points;
pub mod pool;

pub use pool::SqliteDb;
