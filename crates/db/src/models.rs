//! Datenmodelle fuer das Ladepunkt-Repository

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Gespeicherter Ladepunkt mit Zugangsdaten
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadepunktRecord {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub phone: String,
    /// Adresse des vorgelagerten Servers
    pub server_address: String,
    /// Geheimer Schluessel fuer die Anmeldung am Gateway
    pub authorization_key: String,
    /// Aus dem Namen abgeleitete Identitaet
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Daten fuer einen neuen Ladepunkt
#[derive(Debug, Clone)]
pub struct NeuerLadepunkt<'a> {
    pub name: &'a str,
    pub address: &'a str,
    pub phone: &'a str,
    pub server_address: &'a str,
    pub authorization_key: &'a str,
    pub username: &'a str,
}

/// Aenderbare Felder eines Ladepunkts (nur gesetzte Felder werden geschrieben)
#[derive(Debug, Clone, Default)]
pub struct LadepunktUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub server_address: Option<String>,
    pub authorization_key: Option<String>,
    pub username: Option<String>,
}

impl LadepunktUpdate {
    /// Gibt true zurueck wenn kein Feld gesetzt ist
    pub fn ist_leer(&self) -> bool {
        self.name.is_none()
            && self.address.is_none()
            && self.phone.is_none()
            && self.server_address.is_none()
            && self.authorization_key.is_none()
            && self.username.is_none()
    }
}
