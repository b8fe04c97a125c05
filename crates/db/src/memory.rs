//! Fluechtiges Repository im Arbeitsspeicher
//!
//! Verhaelt sich wie das SQLite-Backend (fortlaufende IDs, eindeutige
//! Benutzernamen), haelt aber nichts ueber einen Neustart hinaus.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::error::DbError;
use crate::models::{LadepunktRecord, LadepunktUpdate, NeuerLadepunkt};
use crate::repository::{ChargePointRepository, DbResult};

#[derive(Debug, Default)]
struct Inhalt {
    naechste_id: i64,
    eintraege: BTreeMap<i64, LadepunktRecord>,
}

/// In-Memory-Repository fuer Ladepunkte
#[derive(Debug, Default)]
pub struct MemoryRepository {
    inhalt: Mutex<Inhalt>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anzahl gespeicherter Ladepunkte
    pub fn anzahl(&self) -> usize {
        self.inhalt.lock().eintraege.len()
    }
}

#[async_trait]
impl ChargePointRepository for MemoryRepository {
    async fn list(&self) -> DbResult<Vec<LadepunktRecord>> {
        Ok(self.inhalt.lock().eintraege.values().cloned().collect())
    }

    async fn get_by_id(&self, id: i64) -> DbResult<Option<LadepunktRecord>> {
        Ok(self.inhalt.lock().eintraege.get(&id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> DbResult<Option<LadepunktRecord>> {
        Ok(self
            .inhalt
            .lock()
            .eintraege
            .values()
            .find(|r| r.username == username)
            .cloned())
    }

    async fn create(&self, data: NeuerLadepunkt<'_>) -> DbResult<LadepunktRecord> {
        let mut inhalt = self.inhalt.lock();
        if inhalt.eintraege.values().any(|r| r.username == data.username) {
            return Err(DbError::Eindeutigkeit(format!(
                "Benutzername '{}' bereits vergeben",
                data.username
            )));
        }

        inhalt.naechste_id += 1;
        let id = inhalt.naechste_id;
        let now = Utc::now();
        let record = LadepunktRecord {
            id,
            name: data.name.to_string(),
            address: data.address.to_string(),
            phone: data.phone.to_string(),
            server_address: data.server_address.to_string(),
            authorization_key: data.authorization_key.to_string(),
            username: data.username.to_string(),
            created_at: now,
            updated_at: now,
        };
        inhalt.eintraege.insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: i64, data: LadepunktUpdate) -> DbResult<LadepunktRecord> {
        let mut inhalt = self.inhalt.lock();

        if let Some(ref neu) = data.username {
            if inhalt
                .eintraege
                .values()
                .any(|r| r.id != id && &r.username == neu)
            {
                return Err(DbError::Eindeutigkeit(format!(
                    "Benutzername '{neu}' bereits vergeben"
                )));
            }
        }

        let leer = data.ist_leer();
        let record = inhalt
            .eintraege
            .get_mut(&id)
            .ok_or_else(|| DbError::nicht_gefunden(format!("Ladepunkt {id}")))?;
        if leer {
            return Ok(record.clone());
        }

        if let Some(v) = data.name {
            record.name = v;
        }
        if let Some(v) = data.address {
            record.address = v;
        }
        if let Some(v) = data.phone {
            record.phone = v;
        }
        if let Some(v) = data.server_address {
            record.server_address = v;
        }
        if let Some(v) = data.authorization_key {
            record.authorization_key = v;
        }
        if let Some(v) = data.username {
            record.username = v;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete(&self, id: i64) -> DbResult<bool> {
        Ok(self.inhalt.lock().eintraege.remove(&id).is_some())
    }
}
