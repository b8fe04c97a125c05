//! Authenticator fuer eingehende Ladepunkt-Verbindungen
//!
//! Prueft eine behauptete Identitaet gegen den gespeicherten Schluessel.
//! Unbekannte Identitaet, falscher Schluessel und Datenbankfehler ergeben
//! dasselbe Ergebnis. Auch fuer unbekannte Identitaeten wird ein
//! Vergleich in konstanter Zeit durchgefuehrt, damit beide Pfade gleich
//! lange dauern.

use std::sync::Arc;

use subtle::ConstantTimeEq;

use ladenetz_db::{ChargePointRepository, LadepunktRecord};

use crate::credentials::schluessel_generieren;

/// Ergebnis einer Authentifizierung
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErgebnis {
    /// Identitaet und Schluessel stimmen
    Autorisiert(LadepunktRecord),
    /// Identitaet unbekannt oder Schluessel falsch
    NichtAutorisiert,
}

impl AuthErgebnis {
    pub fn ist_autorisiert(&self) -> bool {
        matches!(self, Self::Autorisiert(_))
    }
}

/// Prueft Zugangsdaten gegen das Ladepunkt-Repository
pub struct Authenticator {
    repo: Arc<dyn ChargePointRepository>,
    /// Vergleichswert fuer unbekannte Identitaeten
    platzhalter: Vec<u8>,
}

impl Authenticator {
    pub fn neu(repo: Arc<dyn ChargePointRepository>) -> Self {
        Self {
            repo,
            platzhalter: schluessel_generieren().into_bytes(),
        }
    }

    /// Prueft `schluessel` fuer die behauptete Identitaet
    ///
    /// Hat keine Seiteneffekte ausser der Abfrage im Repository.
    pub async fn authentifizieren(&self, identitaet: &str, schluessel: &[u8]) -> AuthErgebnis {
        let record = match self.repo.get_by_username(identitaet).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    ladepunkt = %identitaet,
                    fehler = %e,
                    "Repository-Fehler bei Authentifizierung, Verbindung wird abgelehnt"
                );
                None
            }
        };

        let erwartet = match &record {
            Some(r) => r.authorization_key.as_bytes(),
            None => self.platzhalter.as_slice(),
        };
        let gleich: bool = erwartet.ct_eq(schluessel).into();

        match record {
            Some(r) if gleich => AuthErgebnis::Autorisiert(r),
            _ => {
                tracing::debug!(ladepunkt = %identitaet, "Authentifizierung abgelehnt");
                AuthErgebnis::NichtAutorisiert
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ladenetz_db::{DbError, DbResult, LadepunktUpdate, MemoryRepository, NeuerLadepunkt};

    /// Repository das bei jedem Zugriff fehlschlaegt
    struct KaputtesRepo;

    #[async_trait]
    impl ChargePointRepository for KaputtesRepo {
        async fn list(&self) -> DbResult<Vec<LadepunktRecord>> {
            Err(DbError::intern("kaputt"))
        }
        async fn get_by_id(&self, _id: i64) -> DbResult<Option<LadepunktRecord>> {
            Err(DbError::intern("kaputt"))
        }
        async fn get_by_username(&self, _username: &str) -> DbResult<Option<LadepunktRecord>> {
            Err(DbError::intern("kaputt"))
        }
        async fn create(&self, _data: NeuerLadepunkt<'_>) -> DbResult<LadepunktRecord> {
            Err(DbError::intern("kaputt"))
        }
        async fn update(&self, _id: i64, _data: LadepunktUpdate) -> DbResult<LadepunktRecord> {
            Err(DbError::intern("kaputt"))
        }
        async fn delete(&self, _id: i64) -> DbResult<bool> {
            Err(DbError::intern("kaputt"))
        }
    }

    async fn authenticator_mit_ladepunkt() -> Authenticator {
        let repo = Arc::new(MemoryRepository::new());
        repo.create(NeuerLadepunkt {
            name: "CP 1",
            address: "",
            phone: "",
            server_address: "",
            authorization_key: "richtig",
            username: "cp-1",
        })
        .await
        .unwrap();
        Authenticator::neu(repo)
    }

    #[tokio::test]
    async fn richtiger_schluessel_wird_akzeptiert() {
        let auth = authenticator_mit_ladepunkt().await;
        match auth.authentifizieren("cp-1", b"richtig").await {
            AuthErgebnis::Autorisiert(r) => assert_eq!(r.username, "cp-1"),
            AuthErgebnis::NichtAutorisiert => panic!("Autorisierung erwartet"),
        }
    }

    #[tokio::test]
    async fn falscher_schluessel_und_unbekannte_identitaet_gleich() {
        let auth = authenticator_mit_ladepunkt().await;
        let falsch = auth.authentifizieren("cp-1", b"falsch").await;
        let unbekannt = auth.authentifizieren("cp-9", b"richtig").await;
        assert_eq!(falsch, AuthErgebnis::NichtAutorisiert);
        assert_eq!(unbekannt, AuthErgebnis::NichtAutorisiert);
    }

    #[tokio::test]
    async fn leerer_schluessel_wird_abgelehnt() {
        let auth = authenticator_mit_ladepunkt().await;
        assert!(!auth.authentifizieren("cp-1", b"").await.ist_autorisiert());
    }

    #[tokio::test]
    async fn repository_fehler_lehnt_ab() {
        let auth = Authenticator::neu(Arc::new(KaputtesRepo));
        assert_eq!(
            auth.authentifizieren("cp-1", b"richtig").await,
            AuthErgebnis::NichtAutorisiert
        );
    }
}
