//! Ladepunkt-Service
//!
//! Legt Ladepunkte an, aendert und loescht sie und rotiert ihre
//! Schluessel. Benutzernamen werden immer aus dem Namen abgeleitet,
//! Schluessel immer neu erzeugt; beides laesst sich von aussen nicht setzen.

use std::sync::Arc;

use serde::Deserialize;

use ladenetz_db::{ChargePointRepository, DbError, LadepunktRecord, LadepunktUpdate, NeuerLadepunkt};

use crate::credentials::{benutzername_ableiten, schluessel_generieren};
use crate::error::{AuthError, AuthResult};

/// Eingabe fuer einen neuen Ladepunkt
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NeuerLadepunktEingabe {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub server_address: String,
}

/// Aenderbare Stammdaten eines Ladepunkts
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LadepunktAenderung {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub server_address: Option<String>,
}

/// Service fuer die Verwaltung von Ladepunkten
#[derive(Clone)]
pub struct LadepunktService {
    repo: Arc<dyn ChargePointRepository>,
}

impl LadepunktService {
    pub fn neu(repo: Arc<dyn ChargePointRepository>) -> Self {
        Self { repo }
    }

    /// Legt einen Ladepunkt mit frisch erzeugtem Schluessel an
    pub async fn anlegen(&self, eingabe: NeuerLadepunktEingabe) -> AuthResult<LadepunktRecord> {
        let username = benutzername_pruefen(&eingabe.name)?;
        let schluessel = schluessel_generieren();

        let record = self
            .repo
            .create(NeuerLadepunkt {
                name: eingabe.name.trim(),
                address: &eingabe.address,
                phone: &eingabe.phone,
                server_address: &eingabe.server_address,
                authorization_key: &schluessel,
                username: &username,
            })
            .await
            .map_err(|e| vergeben_oder(e, &username))?;

        tracing::info!(
            id = record.id,
            ladepunkt = %record.username,
            "Neuer Ladepunkt angelegt"
        );
        Ok(record)
    }

    /// Alle Ladepunkte
    pub async fn liste(&self) -> AuthResult<Vec<LadepunktRecord>> {
        Ok(self.repo.list().await?)
    }

    pub async fn laden(&self, id: i64) -> AuthResult<LadepunktRecord> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or(AuthError::LadepunktNichtGefunden(id))
    }

    /// Aendert Stammdaten; ein neuer Name leitet den Benutzernamen neu ab
    pub async fn aktualisieren(
        &self,
        id: i64,
        aenderung: LadepunktAenderung,
    ) -> AuthResult<LadepunktRecord> {
        let username = match &aenderung.name {
            Some(name) => Some(benutzername_pruefen(name)?),
            None => None,
        };

        let update = LadepunktUpdate {
            name: aenderung.name.map(|n| n.trim().to_string()),
            address: aenderung.address,
            phone: aenderung.phone,
            server_address: aenderung.server_address,
            authorization_key: None,
            username: username.clone(),
        };

        let record = self.repo.update(id, update).await.map_err(|e| match e {
            DbError::NichtGefunden(_) => AuthError::LadepunktNichtGefunden(id),
            andere => vergeben_oder(andere, username.as_deref().unwrap_or_default()),
        })?;

        tracing::info!(id, ladepunkt = %record.username, "Ladepunkt aktualisiert");
        Ok(record)
    }

    /// Loescht einen Ladepunkt; `false` wenn es ihn nicht gab
    pub async fn loeschen(&self, id: i64) -> AuthResult<bool> {
        let geloescht = self.repo.delete(id).await?;
        if geloescht {
            tracing::info!(id, "Ladepunkt geloescht");
        }
        Ok(geloescht)
    }

    /// Ersetzt den Schluessel eines Ladepunkts durch einen neuen
    pub async fn schluessel_rotieren(&self, id: i64) -> AuthResult<LadepunktRecord> {
        let update = LadepunktUpdate {
            authorization_key: Some(schluessel_generieren()),
            ..Default::default()
        };

        let record = self.repo.update(id, update).await.map_err(|e| match e {
            DbError::NichtGefunden(_) => AuthError::LadepunktNichtGefunden(id),
            andere => AuthError::Datenbank(andere),
        })?;

        tracing::info!(id, ladepunkt = %record.username, "Schluessel rotiert");
        Ok(record)
    }
}

fn benutzername_pruefen(name: &str) -> AuthResult<String> {
    let username = benutzername_ableiten(name);
    if username.is_empty() {
        return Err(AuthError::BenutzernameUngueltig(name.to_string()));
    }
    Ok(username)
}

fn vergeben_oder(e: DbError, username: &str) -> AuthError {
    if e.ist_eindeutigkeit() {
        AuthError::BenutzernameVergeben(username.to_string())
    } else {
        AuthError::Datenbank(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ladenetz_db::MemoryRepository;

    fn service() -> LadepunktService {
        LadepunktService::neu(Arc::new(MemoryRepository::new()))
    }

    fn eingabe(name: &str) -> NeuerLadepunktEingabe {
        NeuerLadepunktEingabe {
            name: name.into(),
            address: "Ringstrasse 7".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn anlegen_leitet_benutzernamen_ab() {
        let svc = service();
        let lp = svc.anlegen(eingabe("Tiefgarage West")).await.unwrap();
        assert_eq!(lp.username, "tiefgarage-west");
        assert_eq!(lp.authorization_key.len(), crate::credentials::SCHLUESSEL_LAENGE);
    }

    #[tokio::test]
    async fn anlegen_ohne_gueltigen_namen() {
        let svc = service();
        let err = svc.anlegen(eingabe("!!!")).await.unwrap_err();
        assert!(matches!(err, AuthError::BenutzernameUngueltig(_)));
    }

    #[tokio::test]
    async fn gleicher_name_doppelt() {
        let svc = service();
        svc.anlegen(eingabe("Halle 1")).await.unwrap();
        let err = svc.anlegen(eingabe("halle 1")).await.unwrap_err();
        assert!(matches!(err, AuthError::BenutzernameVergeben(ref u) if u == "halle-1"));
    }

    #[tokio::test]
    async fn umbenennen_aendert_benutzernamen() {
        let svc = service();
        let lp = svc.anlegen(eingabe("Alt")).await.unwrap();

        let neu = svc
            .aktualisieren(
                lp.id,
                LadepunktAenderung {
                    name: Some("Neuer Name".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(neu.username, "neuer-name");
        assert_eq!(neu.authorization_key, lp.authorization_key);
    }

    #[tokio::test]
    async fn rotation_erzeugt_neuen_schluessel() {
        let svc = service();
        let lp = svc.anlegen(eingabe("Rotor")).await.unwrap();
        let rotiert = svc.schluessel_rotieren(lp.id).await.unwrap();
        assert_ne!(rotiert.authorization_key, lp.authorization_key);
        assert_eq!(rotiert.username, lp.username);
    }

    #[tokio::test]
    async fn unbekannte_id() {
        let svc = service();
        assert!(matches!(
            svc.laden(42).await.unwrap_err(),
            AuthError::LadepunktNichtGefunden(42)
        ));
        assert!(matches!(
            svc.schluessel_rotieren(42).await.unwrap_err(),
            AuthError::LadepunktNichtGefunden(42)
        ));
        assert!(!svc.loeschen(42).await.unwrap());
    }
}
