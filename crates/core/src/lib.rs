//! ladenetz-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Ladenetz-Crates gemeinsam genutzt werden.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{LadenetzError, Result};
pub use event::LadenetzEvent;
pub use types::{ChargePointId, SessionId};
