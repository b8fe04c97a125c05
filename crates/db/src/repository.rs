//! Repository-Trait-Definitionen
//!
//! Das Repository-Pattern entkoppelt Gateway und Verwaltung von der
//! konkreten Speicherung. Es gibt ein SQLite-Backend fuer den Betrieb und
//! ein In-Memory-Backend fuer Tests und fluechtige Installationen.

use async_trait::async_trait;

use crate::error::DbError;
use crate::models::{LadepunktRecord, LadepunktUpdate, NeuerLadepunkt};

/// Ergebnis-Alias fuer Datenbankoperationen
pub type DbResult<T> = Result<T, DbError>;

/// Unterstuetzte Datenbank-Backends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseBackend {
    /// SQLite – Standard
    Sqlite,
    /// Fluechtiger Speicher ohne Persistenz
    Memory,
}

impl std::fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => write!(f, "SQLite"),
            Self::Memory => write!(f, "In-Memory"),
        }
    }
}

/// Konfiguration fuer die Datenbankverbindung
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Ausgewaehltes Backend
    pub backend: DatabaseBackend,
    /// Verbindungs-URL (z.B. "sqlite://ladenetz.db")
    pub url: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen im Pool
    pub max_verbindungen: u32,
    /// Ob WAL-Modus bei SQLite aktiviert werden soll
    pub sqlite_wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Sqlite,
            url: "sqlite://ladenetz.db".into(),
            max_verbindungen: 5,
            sqlite_wal: true,
        }
    }
}

/// Zugriff auf gespeicherte Ladepunkte
///
/// Der Authenticator nutzt `get_by_username`, die Verwaltung den Rest.
#[async_trait]
pub trait ChargePointRepository: Send + Sync {
    /// Alle Ladepunkte, aufsteigend nach ID
    async fn list(&self) -> DbResult<Vec<LadepunktRecord>>;

    async fn get_by_id(&self, id: i64) -> DbResult<Option<LadepunktRecord>>;

    async fn get_by_username(&self, username: &str) -> DbResult<Option<LadepunktRecord>>;

    /// Legt einen Ladepunkt an; doppelte Benutzernamen ergeben `Eindeutigkeit`
    async fn create(&self, data: NeuerLadepunkt<'_>) -> DbResult<LadepunktRecord>;

    /// Aendert die gesetzten Felder; unbekannte ID ergibt `NichtGefunden`
    async fn update(&self, id: i64, data: LadepunktUpdate) -> DbResult<LadepunktRecord>;

    /// Gibt `true` zurueck wenn ein Datensatz entfernt wurde
    async fn delete(&self, id: i64) -> DbResult<bool>;

    /// Prueft ob das Backend erreichbar ist
    async fn ping(&self) -> DbResult<()> {
        Ok(())
    }
}
